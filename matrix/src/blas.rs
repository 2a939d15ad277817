//! Column-major level-3 kernels on raw slices with explicit leading dimensions.

/// C = alpha A B + beta C, A: m x k, B: k x n, C: m x n.
#[allow(clippy::too_many_arguments)]
pub fn gemm_nn(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    lda: usize,
    b: &[f64],
    ldb: usize,
    beta: f64,
    c: &mut [f64],
    ldc: usize,
) {
    for j in 0..n {
        let cj = &mut c[j * ldc..j * ldc + m];
        scale(cj, beta);

        for l in 0..k {
            let f = alpha * b[l + j * ldb];
            if f == 0.0 {
                continue;
            }

            let al = &a[l * lda..l * lda + m];
            for (ci, ai) in cj.iter_mut().zip(al.iter()) {
                *ci += f * ai;
            }
        }
    }
}

/// C = alpha Aᵀ B + beta C, A: k x m, B: k x n, C: m x n.
#[allow(clippy::too_many_arguments)]
pub fn gemm_tn(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    lda: usize,
    b: &[f64],
    ldb: usize,
    beta: f64,
    c: &mut [f64],
    ldc: usize,
) {
    for j in 0..n {
        let bj = &b[j * ldb..j * ldb + k];

        for i in 0..m {
            let ai = &a[i * lda..i * lda + k];
            let dot: f64 = ai.iter().zip(bj.iter()).map(|(x, y)| x * y).sum();

            let cij = &mut c[i + j * ldc];
            *cij = alpha * dot + if beta == 0.0 { 0.0 } else { beta * *cij };
        }
    }
}

/// Lower triangle of C = alpha (Aᵀ B + Bᵀ A) + beta C, A, B: k x n, C: n x n.
/// The strict upper triangle of C is not referenced.
#[allow(clippy::too_many_arguments)]
pub fn syr2k_lower_tn(
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    lda: usize,
    b: &[f64],
    ldb: usize,
    beta: f64,
    c: &mut [f64],
    ldc: usize,
) {
    for j in 0..n {
        let aj = &a[j * lda..j * lda + k];
        let bj = &b[j * ldb..j * ldb + k];

        for i in j..n {
            let ai = &a[i * lda..i * lda + k];
            let bi = &b[i * ldb..i * ldb + k];

            let mut dot = 0.0;
            for l in 0..k {
                dot += ai[l] * bj[l] + bi[l] * aj[l];
            }

            let cij = &mut c[i + j * ldc];
            *cij = alpha * dot + if beta == 0.0 { 0.0 } else { beta * *cij };
        }
    }
}

fn scale(x: &mut [f64], beta: f64) {
    if beta == 0.0 {
        x.iter_mut().for_each(|v| *v = 0.0);
    } else if beta != 1.0 {
        x.iter_mut().for_each(|v| *v *= beta);
    }
}
