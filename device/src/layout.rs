//! Per-task slab layout of the variable region.
//!
//! Every task owns one slab of `stride` words. Inside a slab the fields are
//! laid out back to back in `Field::ALL` order, each sized from the
//! batch-wide maxima; fields a call does not request have length 0.

use crate::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferView {
    pub offset: usize,
    pub len: usize,
}

impl BufferView {
    pub fn new(offset: usize, len: usize) -> BufferView {
        BufferView { offset, len }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn slice<'a>(&self, data: &'a [f64]) -> Result<&'a [f64], DeviceError> {
        if self.end() > data.len() {
            return Err(self.out_of_bounds(data.len()));
        }

        Ok(&data[self.offset..self.end()])
    }

    pub fn slice_mut<'a>(&self, data: &'a mut [f64]) -> Result<&'a mut [f64], DeviceError> {
        if self.end() > data.len() {
            return Err(self.out_of_bounds(data.len()));
        }

        let end = self.end();
        Ok(&mut data[self.offset..end])
    }

    /// Sub-view relative to this view.
    pub fn sub(&self, offset: usize, len: usize) -> Result<BufferView, DeviceError> {
        if offset + len > self.len {
            return Err(DeviceError::ViewOutOfBounds {
                offset,
                len,
                size: self.len,
            });
        }

        Ok(BufferView::new(self.offset + offset, len))
    }

    fn out_of_bounds(&self, size: usize) -> DeviceError {
        DeviceError::ViewOutOfBounds {
            offset: self.offset,
            len: self.len,
            size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    PointsX,
    PointsY,
    PointsZ,
    Weights,
    Bf,
    DbfX,
    DbfY,
    DbfZ,
    D2bfXX,
    D2bfXY,
    D2bfXZ,
    D2bfYY,
    D2bfYZ,
    D2bfZZ,
    NbeScr,
    Zmat,
    XmatX,
    XmatY,
    XmatZ,
    Den,
    DenX,
    DenY,
    DenZ,
    Gamma,
    Eps,
    Vrho,
    Vgamma,
    ZmatMag,
    DenMag,
    DenMagX,
    DenMagY,
    DenMagZ,
    RhoSpin,
    GammaSpin,
    VrhoSpin,
    VgammaSpin,
    Fmat,
    Gmat,
}

pub const NFIELDS: usize = 38;

impl Field {
    pub const ALL: [Field; NFIELDS] = [
        Field::PointsX,
        Field::PointsY,
        Field::PointsZ,
        Field::Weights,
        Field::Bf,
        Field::DbfX,
        Field::DbfY,
        Field::DbfZ,
        Field::D2bfXX,
        Field::D2bfXY,
        Field::D2bfXZ,
        Field::D2bfYY,
        Field::D2bfYZ,
        Field::D2bfZZ,
        Field::NbeScr,
        Field::Zmat,
        Field::XmatX,
        Field::XmatY,
        Field::XmatZ,
        Field::Den,
        Field::DenX,
        Field::DenY,
        Field::DenZ,
        Field::Gamma,
        Field::Eps,
        Field::Vrho,
        Field::Vgamma,
        Field::ZmatMag,
        Field::DenMag,
        Field::DenMagX,
        Field::DenMagY,
        Field::DenMagZ,
        Field::RhoSpin,
        Field::GammaSpin,
        Field::VrhoSpin,
        Field::VgammaSpin,
        Field::Fmat,
        Field::Gmat,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Quantities a local-work call needs slab storage for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements {
    pub bf_grad: bool,
    pub bf_hess: bool,
    pub xmat: bool,
    pub xmat_grad: bool,
    pub den: bool,
    pub den_grad: bool,
    pub functional: bool,
    /// Second density channel; spin-resolved functional inputs replace
    /// the closed-shell ones.
    pub polarized: bool,
    pub exx: bool,
}

impl Requirements {
    pub fn integrate_den() -> Requirements {
        Requirements {
            xmat: true,
            den: true,
            ..Default::default()
        }
    }

    pub fn exc_vxc(gga: bool) -> Requirements {
        Requirements {
            bf_grad: gga,
            xmat: true,
            den: true,
            den_grad: gga,
            functional: true,
            ..Default::default()
        }
    }

    pub fn exc_vxc_polarized(gga: bool) -> Requirements {
        Requirements {
            polarized: true,
            ..Requirements::exc_vxc(gga)
        }
    }

    pub fn exc_grad(gga: bool) -> Requirements {
        Requirements {
            bf_grad: true,
            bf_hess: gga,
            xmat: true,
            xmat_grad: gga,
            den: true,
            den_grad: gga,
            functional: true,
            ..Default::default()
        }
    }

    pub fn exx() -> Requirements {
        Requirements {
            exx: true,
            ..Default::default()
        }
    }

    fn field_len(&self, field: Field, npts: usize, nbe: usize, nbe_cou: usize) -> usize {
        let grid = npts;
        let bfn = npts * nbe;
        let closed = !self.polarized;

        match field {
            Field::PointsX | Field::PointsY | Field::PointsZ | Field::Weights => grid,
            Field::Bf => bfn,
            Field::DbfX | Field::DbfY | Field::DbfZ => {
                if self.bf_grad || self.bf_hess {
                    bfn
                } else {
                    0
                }
            }
            Field::D2bfXX
            | Field::D2bfXY
            | Field::D2bfXZ
            | Field::D2bfYY
            | Field::D2bfYZ
            | Field::D2bfZZ => {
                if self.bf_hess {
                    bfn
                } else {
                    0
                }
            }
            Field::NbeScr => {
                if self.exx {
                    (nbe * nbe).max(nbe * nbe_cou)
                } else if self.polarized {
                    2 * nbe * nbe
                } else {
                    nbe * nbe
                }
            }
            Field::Zmat => {
                if self.xmat {
                    bfn
                } else {
                    0
                }
            }
            Field::XmatX | Field::XmatY | Field::XmatZ => {
                if self.xmat_grad {
                    bfn
                } else {
                    0
                }
            }
            Field::Den => {
                if self.den {
                    grid
                } else {
                    0
                }
            }
            Field::DenX | Field::DenY | Field::DenZ => {
                if self.den_grad {
                    grid
                } else {
                    0
                }
            }
            Field::Gamma => {
                if self.den_grad && closed {
                    grid
                } else {
                    0
                }
            }
            Field::Eps => {
                if self.functional {
                    grid
                } else {
                    0
                }
            }
            Field::Vrho => {
                if self.functional && closed {
                    grid
                } else {
                    0
                }
            }
            Field::Vgamma => {
                if self.functional && self.den_grad && closed {
                    grid
                } else {
                    0
                }
            }
            Field::ZmatMag => {
                if self.polarized && self.xmat {
                    bfn
                } else {
                    0
                }
            }
            Field::DenMag => {
                if self.polarized && self.den {
                    grid
                } else {
                    0
                }
            }
            Field::DenMagX | Field::DenMagY | Field::DenMagZ => {
                if self.polarized && self.den_grad {
                    grid
                } else {
                    0
                }
            }
            Field::RhoSpin | Field::VrhoSpin => {
                if self.polarized && self.functional {
                    2 * grid
                } else {
                    0
                }
            }
            Field::GammaSpin | Field::VgammaSpin => {
                if self.polarized && self.functional && self.den_grad {
                    3 * grid
                } else {
                    0
                }
            }
            Field::Fmat | Field::Gmat => {
                if self.exx {
                    npts * nbe_cou
                } else {
                    0
                }
            }
        }
    }
}

/// Slab layout derived from batch-wide maxima.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlabLayout {
    npts_max: usize,
    nbe_max: usize,
    nbe_cou_max: usize,
    requirements: Requirements,
    views: [BufferView; NFIELDS],
    stride: usize,
}

impl SlabLayout {
    pub fn new(npts_max: usize, nbe_max: usize, nbe_cou_max: usize, requirements: Requirements) -> SlabLayout {
        let mut views = [BufferView::default(); NFIELDS];
        let mut offset = 0;

        for field in Field::ALL.iter() {
            let len = requirements.field_len(*field, npts_max, nbe_max, nbe_cou_max);
            views[field.index()] = BufferView::new(offset, len);
            offset += len;
        }

        SlabLayout {
            npts_max,
            nbe_max,
            nbe_cou_max,
            requirements,
            views,
            stride: offset,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn npts_max(&self) -> usize {
        self.npts_max
    }

    pub fn nbe_max(&self) -> usize {
        self.nbe_max
    }

    pub fn nbe_cou_max(&self) -> usize {
        self.nbe_cou_max
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    pub fn view(&self, field: Field) -> BufferView {
        self.views[field.index()]
    }

    /// Words a task with the given extents actually touches.
    pub fn used_words(&self, npts: usize, nbe: usize, nbe_cou: usize) -> usize {
        Field::ALL
            .iter()
            .map(|f| self.requirements.field_len(*f, npts, nbe, nbe_cou))
            .sum()
    }

    /// Splits one slab into disjoint per-field views.
    pub fn split<'a>(&self, slab: &'a mut [f64]) -> Result<TaskBuffers<'a>, DeviceError> {
        if slab.len() < self.stride {
            return Err(DeviceError::ViewOutOfBounds {
                offset: 0,
                len: self.stride,
                size: slab.len(),
            });
        }

        let mut rest = &mut slab[..self.stride];
        let mut next = |f: Field| take(&mut rest, self.view(f).len);

        Ok(TaskBuffers {
            points_x: next(Field::PointsX),
            points_y: next(Field::PointsY),
            points_z: next(Field::PointsZ),
            weights: next(Field::Weights),
            bf: next(Field::Bf),
            dbfx: next(Field::DbfX),
            dbfy: next(Field::DbfY),
            dbfz: next(Field::DbfZ),
            d2bfxx: next(Field::D2bfXX),
            d2bfxy: next(Field::D2bfXY),
            d2bfxz: next(Field::D2bfXZ),
            d2bfyy: next(Field::D2bfYY),
            d2bfyz: next(Field::D2bfYZ),
            d2bfzz: next(Field::D2bfZZ),
            nbe_scr: next(Field::NbeScr),
            zmat: next(Field::Zmat),
            xmat_x: next(Field::XmatX),
            xmat_y: next(Field::XmatY),
            xmat_z: next(Field::XmatZ),
            den: next(Field::Den),
            den_x: next(Field::DenX),
            den_y: next(Field::DenY),
            den_z: next(Field::DenZ),
            gamma: next(Field::Gamma),
            eps: next(Field::Eps),
            vrho: next(Field::Vrho),
            vgamma: next(Field::Vgamma),
            zmat_mag: next(Field::ZmatMag),
            den_mag: next(Field::DenMag),
            den_mag_x: next(Field::DenMagX),
            den_mag_y: next(Field::DenMagY),
            den_mag_z: next(Field::DenMagZ),
            rho_spin: next(Field::RhoSpin),
            gamma_spin: next(Field::GammaSpin),
            vrho_spin: next(Field::VrhoSpin),
            vgamma_spin: next(Field::VgammaSpin),
            fmat: next(Field::Fmat),
            gmat: next(Field::Gmat),
        })
    }
}

fn take<'a>(rest: &mut &'a mut [f64], len: usize) -> &'a mut [f64] {
    let (head, tail) = std::mem::take(rest).split_at_mut(len);
    *rest = tail;
    head
}

/// Disjoint mutable views into one task slab. Matrices are column-major
/// with leading dimension npts (basis-function blocks) or nbe (`nbe_scr`).
#[derive(Debug)]
pub struct TaskBuffers<'a> {
    pub points_x: &'a mut [f64],
    pub points_y: &'a mut [f64],
    pub points_z: &'a mut [f64],
    pub weights: &'a mut [f64],
    pub bf: &'a mut [f64],
    pub dbfx: &'a mut [f64],
    pub dbfy: &'a mut [f64],
    pub dbfz: &'a mut [f64],
    pub d2bfxx: &'a mut [f64],
    pub d2bfxy: &'a mut [f64],
    pub d2bfxz: &'a mut [f64],
    pub d2bfyy: &'a mut [f64],
    pub d2bfyz: &'a mut [f64],
    pub d2bfzz: &'a mut [f64],
    pub nbe_scr: &'a mut [f64],
    /// X matrix, overwritten by Z.
    pub zmat: &'a mut [f64],
    pub xmat_x: &'a mut [f64],
    pub xmat_y: &'a mut [f64],
    pub xmat_z: &'a mut [f64],
    pub den: &'a mut [f64],
    pub den_x: &'a mut [f64],
    pub den_y: &'a mut [f64],
    pub den_z: &'a mut [f64],
    pub gamma: &'a mut [f64],
    pub eps: &'a mut [f64],
    pub vrho: &'a mut [f64],
    pub vgamma: &'a mut [f64],
    /// Magnetization X matrix, overwritten by its Z.
    pub zmat_mag: &'a mut [f64],
    pub den_mag: &'a mut [f64],
    pub den_mag_x: &'a mut [f64],
    pub den_mag_y: &'a mut [f64],
    pub den_mag_z: &'a mut [f64],
    /// Interleaved (ρ↑, ρ↓) per point.
    pub rho_spin: &'a mut [f64],
    /// Interleaved (σ↑↑, σ↑↓, σ↓↓) per point.
    pub gamma_spin: &'a mut [f64],
    pub vrho_spin: &'a mut [f64],
    pub vgamma_spin: &'a mut [f64],
    pub fmat: &'a mut [f64],
    pub gmat: &'a mut [f64],
}

impl<'a> TaskBuffers<'a> {
    pub fn field(&self, field: Field) -> &[f64] {
        match field {
            Field::PointsX => &*self.points_x,
            Field::PointsY => &*self.points_y,
            Field::PointsZ => &*self.points_z,
            Field::Weights => &*self.weights,
            Field::Bf => &*self.bf,
            Field::DbfX => &*self.dbfx,
            Field::DbfY => &*self.dbfy,
            Field::DbfZ => &*self.dbfz,
            Field::D2bfXX => &*self.d2bfxx,
            Field::D2bfXY => &*self.d2bfxy,
            Field::D2bfXZ => &*self.d2bfxz,
            Field::D2bfYY => &*self.d2bfyy,
            Field::D2bfYZ => &*self.d2bfyz,
            Field::D2bfZZ => &*self.d2bfzz,
            Field::NbeScr => &*self.nbe_scr,
            Field::Zmat => &*self.zmat,
            Field::XmatX => &*self.xmat_x,
            Field::XmatY => &*self.xmat_y,
            Field::XmatZ => &*self.xmat_z,
            Field::Den => &*self.den,
            Field::DenX => &*self.den_x,
            Field::DenY => &*self.den_y,
            Field::DenZ => &*self.den_z,
            Field::Gamma => &*self.gamma,
            Field::Eps => &*self.eps,
            Field::Vrho => &*self.vrho,
            Field::Vgamma => &*self.vgamma,
            Field::ZmatMag => &*self.zmat_mag,
            Field::DenMag => &*self.den_mag,
            Field::DenMagX => &*self.den_mag_x,
            Field::DenMagY => &*self.den_mag_y,
            Field::DenMagZ => &*self.den_mag_z,
            Field::RhoSpin => &*self.rho_spin,
            Field::GammaSpin => &*self.gamma_spin,
            Field::VrhoSpin => &*self.vrho_spin,
            Field::VgammaSpin => &*self.vgamma_spin,
            Field::Fmat => &*self.fmat,
            Field::Gmat => &*self.gmat,
        }
    }

    /// Errors when `field` is shorter than `len`.
    pub fn require(&self, field: Field, len: usize) -> Result<(), DeviceError> {
        let size = self.field(field).len();

        if len > size {
            return Err(DeviceError::ViewOutOfBounds { offset: 0, len, size });
        }

        Ok(())
    }
}
