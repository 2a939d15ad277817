mod error;
pub use error::ControlError;

use xwconsts::*;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    str::FromStr,
};

const BACKENDS: [&str; 3] = ["host", "vendor_a", "vendor_b"];
const EXX_BATCHING: [&str; 2] = ["task", "shell"];
const XC_SCHEMES: [&str; 4] = ["slater", "lda", "pbe", "pbe_x"];
const VERBOSITY: [&str; 3] = ["low", "normal", "high"];

#[derive(Debug, Clone)]
pub struct Control {
    backend: String,   // host, vendor_a, vendor_b
    n_aux_queues: usize,
    device_memory_mb: f64,

    xc_scheme: String, // slater, pbe
    exx_batching: String, // task, shell
    exx_symmetrize: bool,
    exx_ek_tolerance: f64, // 0 : no energy-based cou screening

    max_tasks_per_batch: usize, // 0 : whole task list in one local-work call

    verbosity: String,
}

impl Default for Control {
    fn default() -> Self {
        Control::new()
    }
}

impl Control {
    pub fn new() -> Control {
        Control {
            backend: "vendor_a".to_string(),
            n_aux_queues: DEFAULT_AUX_QUEUES,
            device_memory_mb: DEFAULT_DEVICE_MEMORY_MB,
            xc_scheme: "slater".to_string(),
            exx_batching: "task".to_string(),
            exx_symmetrize: false,
            exx_ek_tolerance: 0.0,
            max_tasks_per_batch: 0,
            verbosity: "normal".to_string(),
        }
    }

    pub fn read_file(&mut self, inpfile: &str) -> Result<(), ControlError> {
        let lines = read_file_data_to_vec(inpfile)?;

        self.parse_lines(&lines)
    }

    /// Applies `key = value` lines on top of the current settings.
    /// Blank lines and lines starting with '#' are skipped.
    pub fn parse_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<(), ControlError> {
        for line in lines.iter() {
            let line = line.as_ref();

            let body = line.split('#').next().unwrap_or("").trim();

            if body.is_empty() {
                continue;
            }

            let s: Vec<&str> = body.split('=').map(|x| x.trim()).collect();

            if s.len() != 2 {
                return Err(ControlError::UnknownParameter {
                    line: line.to_string(),
                });
            }

            let (key, value) = (s[0], s[1]);

            match key {
                "backend" => {
                    self.backend = parse_choice(key, value, &BACKENDS)?;
                }

                "n_aux_queues" => {
                    self.n_aux_queues = parse_value(key, value)?;

                    if self.n_aux_queues == 0 {
                        return Err(invalid(key, value));
                    }
                }

                "device_memory_mb" => {
                    self.device_memory_mb = parse_value(key, value)?;

                    if !(self.device_memory_mb > 0.0) {
                        return Err(invalid(key, value));
                    }
                }

                "xc_scheme" => {
                    self.xc_scheme = parse_choice(key, value, &XC_SCHEMES)?;
                }

                "exx_batching" => {
                    self.exx_batching = parse_choice(key, value, &EXX_BATCHING)?;
                }

                "exx_symmetrize" => {
                    self.exx_symmetrize = parse_value(key, value)?;
                }

                "exx_ek_tolerance" => {
                    self.exx_ek_tolerance = parse_value(key, value)?;

                    if !(self.exx_ek_tolerance >= 0.0) {
                        return Err(invalid(key, value));
                    }
                }

                "max_tasks_per_batch" => {
                    self.max_tasks_per_batch = parse_value(key, value)?;
                }

                "verbosity" => {
                    self.verbosity = parse_choice(key, value, &VERBOSITY)?;
                }

                _ => {
                    return Err(ControlError::UnknownParameter {
                        line: line.to_string(),
                    });
                }
            }
        }

        log::debug!("control parameters parsed: {:?}", self);

        Ok(())
    }

    pub fn display(&self) {
        const OUT_WIDTH1: usize = 28;
        const OUT_WIDTH2: usize = 18;

        println!("   {:-^80}", " control parameters ");
        println!();

        println!(
            "   {:<width1$} = {:>width2$}",
            "backend",
            self.get_backend(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "n_aux_queues",
            self.get_n_aux_queues(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$.1} MB",
            "device_memory_mb",
            self.get_device_memory_mb(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "xc_scheme",
            self.get_xc_scheme(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "exx_batching",
            self.get_exx_batching(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "exx_symmetrize",
            self.get_exx_symmetrize(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$.3e}",
            "exx_ek_tolerance",
            self.get_exx_ek_tolerance(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "max_tasks_per_batch",
            self.get_max_tasks_per_batch(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!(
            "   {:<width1$} = {:>width2$}",
            "verbosity",
            self.get_verbosity(),
            width1 = OUT_WIDTH1,
            width2 = OUT_WIDTH2
        );

        println!();
    }

    pub fn get_backend(&self) -> &str {
        &self.backend
    }

    pub fn set_backend(&mut self, backend: &str) {
        self.backend = backend.to_string();
    }

    pub fn get_n_aux_queues(&self) -> usize {
        self.n_aux_queues
    }

    pub fn set_n_aux_queues(&mut self, n: usize) {
        self.n_aux_queues = n.max(1);
    }

    pub fn get_device_memory_mb(&self) -> f64 {
        self.device_memory_mb
    }

    /// Device capacity in f64 words.
    pub fn get_device_memory_words(&self) -> usize {
        (self.device_memory_mb * WORDS_PER_MB) as usize
    }

    pub fn set_device_memory_mb(&mut self, mb: f64) {
        self.device_memory_mb = mb;
    }

    pub fn get_xc_scheme(&self) -> &str {
        &self.xc_scheme
    }

    pub fn set_xc_scheme(&mut self, scheme: &str) {
        self.xc_scheme = scheme.to_string();
    }

    pub fn get_exx_batching(&self) -> &str {
        &self.exx_batching
    }

    pub fn set_exx_batching(&mut self, batching: &str) {
        self.exx_batching = batching.to_string();
    }

    pub fn get_exx_symmetrize(&self) -> bool {
        self.exx_symmetrize
    }

    pub fn get_exx_ek_tolerance(&self) -> f64 {
        self.exx_ek_tolerance
    }

    pub fn set_exx_ek_tolerance(&mut self, tol: f64) {
        self.exx_ek_tolerance = tol.max(0.0);
    }

    pub fn get_max_tasks_per_batch(&self) -> usize {
        self.max_tasks_per_batch
    }

    pub fn set_max_tasks_per_batch(&mut self, n: usize) {
        self.max_tasks_per_batch = n;
    }

    pub fn get_verbosity(&self) -> &str {
        &self.verbosity
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == "high"
    }
}

fn read_file_data_to_vec(inpfile: &str) -> Result<Vec<String>, ControlError> {
    let file = File::open(inpfile).map_err(|e| ControlError::Io {
        path: inpfile.to_string(),
        message: e.to_string(),
    })?;

    let lines = BufReader::new(file).lines();

    lines
        .collect::<std::io::Result<Vec<String>>>()
        .map_err(|e| ControlError::Io {
            path: inpfile.to_string(),
            message: e.to_string(),
        })
}

fn invalid(key: &str, value: &str) -> ControlError {
    ControlError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ControlError> {
    value.parse::<T>().map_err(|_| invalid(key, value))
}

fn parse_choice(key: &str, value: &str, choices: &[&str]) -> Result<String, ControlError> {
    let v = value.to_lowercase();

    if choices.contains(&v.as_str()) {
        Ok(v)
    } else {
        Err(invalid(key, value))
    }
}
