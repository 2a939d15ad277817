use crate::{BufferView, DeviceError, Requirements, SlabLayout, TaskBuffers};

use basis::{BasisSet, Molecule};
use gridtask::GridTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticField {
    ShellCenters,
    ShellExponents,
    ShellCoefficients,
    Coords,
    Rab,
    Dmat,
    /// Magnetization density Pα - Pβ of a spin-polarized call
    DmatZ,
    Vxc,
    VxcZ,
    ExxK,
    ExcGrad,
    Exc,
    Nel,
}

const NSTATIC: usize = 13;

impl StaticField {
    pub const ALL: [StaticField; NSTATIC] = [
        StaticField::ShellCenters,
        StaticField::ShellExponents,
        StaticField::ShellCoefficients,
        StaticField::Coords,
        StaticField::Rab,
        StaticField::Dmat,
        StaticField::DmatZ,
        StaticField::Vxc,
        StaticField::VxcZ,
        StaticField::ExxK,
        StaticField::ExcGrad,
        StaticField::Exc,
        StaticField::Nel,
    ];

    /// Fields cleared at the start of every entry-point call.
    pub const ACCUMULATORS: [StaticField; 6] = [
        StaticField::Vxc,
        StaticField::VxcZ,
        StaticField::ExxK,
        StaticField::ExcGrad,
        StaticField::Exc,
        StaticField::Nel,
    ];
}

/// Host-side descriptor of a shell packed into the static region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellDevice {
    pub l: usize,
    pub pure: bool,
    pub nprim: usize,
    pub prim_offset: usize,
    pub atom: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticLayout {
    nbf: usize,
    natoms: usize,
    nshells: usize,
    views: [BufferView; NSTATIC],
    total: usize,
}

impl StaticLayout {
    pub fn new(nshells: usize, nprim_total: usize, natoms: usize, nbf: usize) -> StaticLayout {
        let mut views = [BufferView::default(); NSTATIC];
        let mut offset = 0;

        for (i, field) in StaticField::ALL.iter().enumerate() {
            let len = match field {
                StaticField::ShellCenters => 3 * nshells,
                StaticField::ShellExponents | StaticField::ShellCoefficients => nprim_total,
                StaticField::Coords => 3 * natoms,
                StaticField::Rab => natoms * natoms,
                StaticField::Dmat
                | StaticField::DmatZ
                | StaticField::Vxc
                | StaticField::VxcZ
                | StaticField::ExxK => nbf * nbf,
                StaticField::ExcGrad => 3 * natoms,
                StaticField::Exc | StaticField::Nel => 1,
            };

            views[i] = BufferView::new(offset, len);
            offset += len;
        }

        StaticLayout {
            nbf,
            natoms,
            nshells,
            views,
            total: offset,
        }
    }

    pub fn view(&self, field: StaticField) -> BufferView {
        self.views[field as usize]
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn nbf(&self) -> usize {
        self.nbf
    }

    pub fn natoms(&self) -> usize {
        self.natoms
    }

    pub fn nshells(&self) -> usize {
        self.nshells
    }
}

/// Shell data read back from the static region.
#[derive(Debug, Clone, Copy)]
pub struct ShellView<'a> {
    pub l: usize,
    pub pure: bool,
    pub atom: usize,
    pub center: [f64; 3],
    pub exponents: &'a [f64],
    pub coefficients: &'a [f64],
}

/// Read-only access to the static region.
#[derive(Debug, Clone, Copy)]
pub struct StaticRegion<'a> {
    data: &'a [f64],
    layout: &'a StaticLayout,
    shells: &'a [ShellDevice],
}

impl<'a> StaticRegion<'a> {
    pub fn field(&self, field: StaticField) -> Result<&'a [f64], DeviceError> {
        self.layout.view(field).slice(self.data)
    }

    pub fn layout(&self) -> &'a StaticLayout {
        self.layout
    }

    pub fn nbf(&self) -> usize {
        self.layout.nbf
    }

    pub fn natoms(&self) -> usize {
        self.layout.natoms
    }

    pub fn nshells(&self) -> usize {
        self.shells.len()
    }

    pub fn shell_descriptor(&self, ish: usize) -> Result<&'a ShellDevice, DeviceError> {
        self.shells.get(ish).ok_or(DeviceError::ViewOutOfBounds {
            offset: ish,
            len: 1,
            size: self.shells.len(),
        })
    }

    pub fn shell(&self, ish: usize) -> Result<ShellView<'a>, DeviceError> {
        let sh = self.shell_descriptor(ish)?;

        let centers = self.layout.view(StaticField::ShellCenters).sub(3 * ish, 3)?;
        let exps = self
            .layout
            .view(StaticField::ShellExponents)
            .sub(sh.prim_offset, sh.nprim)?;
        let coefs = self
            .layout
            .view(StaticField::ShellCoefficients)
            .sub(sh.prim_offset, sh.nprim)?;

        let c = centers.slice(self.data)?;

        Ok(ShellView {
            l: sh.l,
            pure: sh.pure,
            atom: sh.atom,
            center: [c[0], c[1], c[2]],
            exponents: exps.slice(self.data)?,
            coefficients: coefs.slice(self.data)?,
        })
    }
}

/// Mutable access to the static region, for master-queue accumulation.
#[derive(Debug)]
pub struct StaticRegionMut<'a> {
    data: &'a mut [f64],
    layout: &'a StaticLayout,
}

impl<'a> StaticRegionMut<'a> {
    pub fn field(&self, field: StaticField) -> Result<&[f64], DeviceError> {
        self.layout.view(field).slice(&*self.data)
    }

    pub fn field_mut(&mut self, field: StaticField) -> Result<&mut [f64], DeviceError> {
        self.layout.view(field).slice_mut(&mut *self.data)
    }

    pub fn nbf(&self) -> usize {
        self.layout.nbf
    }
}

/// Emulated device memory for one (molecule, basis) lifetime.
///
/// The static region holds basis/geometry data and accumulators. The
/// variable region is a sequence of equally sized task slabs, repacked every
/// local-work call; its high-water mark never shrinks while the
/// (molecule, basis) fingerprint stays the same.
#[derive(Debug, Default)]
pub struct DeviceArena {
    capacity: usize,
    fingerprint: Option<(u64, u64)>,
    generation: usize,

    static_layout: StaticLayout,
    shells: Vec<ShellDevice>,
    static_data: Vec<f64>,

    variable: Vec<f64>,
    watermark: usize,
    slab: Option<SlabLayout>,
    ntasks: usize,
}

impl DeviceArena {
    /// `capacity` in f64 words.
    pub fn new(capacity: usize) -> DeviceArena {
        DeviceArena {
            capacity,
            ..Default::default()
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn static_words(&self) -> usize {
        self.static_data.len()
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Number of static (re)uploads performed so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn ntasks(&self) -> usize {
        self.ntasks
    }

    pub fn static_layout(&self) -> &StaticLayout {
        &self.static_layout
    }

    pub fn shells(&self) -> &[ShellDevice] {
        &self.shells
    }

    pub fn slab_layout(&self) -> Result<&SlabLayout, DeviceError> {
        self.slab.as_ref().ok_or(DeviceError::NotAllocated("variable region"))
    }

    pub fn is_static_current(&self, mol: &Molecule, basis: &BasisSet) -> bool {
        self.fingerprint == Some((mol.fingerprint(), basis.fingerprint()))
    }

    /// Uploads shells, coordinates and distances when the (molecule, basis)
    /// pair differs from the resident one. Returns true on a new upload.
    pub fn ensure_static(&mut self, mol: &Molecule, basis: &BasisSet) -> Result<bool, DeviceError> {
        let fingerprint = (mol.fingerprint(), basis.fingerprint());

        if self.fingerprint == Some(fingerprint) {
            return Ok(false);
        }

        let nprim_total: usize = basis.iter().map(|s| s.get_nprim()).sum();
        let layout = StaticLayout::new(basis.nshells(), nprim_total, mol.natoms(), basis.nbf());

        if layout.total() > self.capacity {
            return Err(DeviceError::OutOfMemory {
                requested: layout.total(),
                available: self.capacity,
            });
        }

        let mut data = vec![0.0; layout.total()];
        let mut shells = Vec::with_capacity(basis.nshells());
        let mut prim_offset = 0;

        {
            let centers = layout.view(StaticField::ShellCenters).slice_mut(&mut data)?;
            for (ish, s) in basis.iter().enumerate() {
                centers[3 * ish..3 * ish + 3].copy_from_slice(&s.get_center().to_array());
            }
        }

        for s in basis.iter() {
            let nprim = s.get_nprim();

            let exps = layout
                .view(StaticField::ShellExponents)
                .sub(prim_offset, nprim)?
                .slice_mut(&mut data)?;
            exps.copy_from_slice(s.get_exponents());

            let coefs = layout
                .view(StaticField::ShellCoefficients)
                .sub(prim_offset, nprim)?
                .slice_mut(&mut data)?;
            coefs.copy_from_slice(s.get_coefficients());

            shells.push(ShellDevice {
                l: s.get_l(),
                pure: s.is_pure(),
                nprim,
                prim_offset,
                atom: s.get_atom(),
            });

            prim_offset += nprim;
        }

        layout
            .view(StaticField::Coords)
            .slice_mut(&mut data)?
            .copy_from_slice(&mol.get_coords());

        layout
            .view(StaticField::Rab)
            .slice_mut(&mut data)?
            .copy_from_slice(&mol.get_rab());

        log::debug!(
            "static region uploaded: {} shells, {} atoms, {} words",
            basis.nshells(),
            mol.natoms(),
            layout.total()
        );

        self.static_layout = layout;
        self.static_data = data;
        self.shells = shells;
        self.fingerprint = Some(fingerprint);
        self.generation += 1;

        // new lifetime
        self.variable = Vec::new();
        self.watermark = 0;
        self.slab = None;
        self.ntasks = 0;

        Ok(true)
    }

    /// Lays out one slab per task from the batch-wide maxima and grows the
    /// variable region if needed.
    pub fn allocate_for(&mut self, tasks: &[GridTask], requirements: Requirements) -> Result<&SlabLayout, DeviceError> {
        if self.fingerprint.is_none() {
            return Err(DeviceError::NotAllocated("static region"));
        }

        let npts_max = tasks.iter().map(|t| t.npts()).max().unwrap_or(0);
        let nbe_max = tasks.iter().map(|t| t.nbe()).max().unwrap_or(0);
        let nbe_cou_max = if requirements.exx {
            tasks.iter().map(|t| t.nbe_cou()).max().unwrap_or(0)
        } else {
            0
        };

        let layout = SlabLayout::new(npts_max, nbe_max, nbe_cou_max, requirements);
        let required = tasks.len() * layout.stride();
        let available = self.capacity.saturating_sub(self.static_words());

        if required > available {
            return Err(DeviceError::OutOfMemory {
                requested: required,
                available,
            });
        }

        if required > self.watermark {
            log::debug!("variable region grows {} -> {} words", self.watermark, required);

            self.watermark = required;
            self.variable.resize(required, 0.0);
        }

        self.ntasks = tasks.len();

        Ok(self.slab.insert(layout))
    }

    /// Rewinds the variable region without releasing it.
    pub fn reset_for_next_call(&mut self) {
        self.slab = None;
        self.ntasks = 0;
    }

    pub fn static_region(&self) -> StaticRegion<'_> {
        StaticRegion {
            data: &self.static_data,
            layout: &self.static_layout,
            shells: &self.shells,
        }
    }

    pub fn static_region_mut(&mut self) -> StaticRegionMut<'_> {
        StaticRegionMut {
            data: &mut self.static_data,
            layout: &self.static_layout,
        }
    }

    pub fn static_slice(&self, field: StaticField) -> Result<&[f64], DeviceError> {
        self.static_layout.view(field).slice(&self.static_data)
    }

    pub fn static_slice_mut(&mut self, field: StaticField) -> Result<&mut [f64], DeviceError> {
        self.static_layout.view(field).slice_mut(&mut self.static_data)
    }

    pub fn zero_accumulators(&mut self) -> Result<(), DeviceError> {
        for field in StaticField::ACCUMULATORS {
            self.static_slice_mut(field)?.iter_mut().for_each(|x| *x = 0.0);
        }

        Ok(())
    }

    pub fn task_buffers_mut(&mut self, task: usize) -> Result<TaskBuffers<'_>, DeviceError> {
        let layout = self.slab.as_ref().ok_or(DeviceError::NotAllocated("variable region"))?;

        if task >= self.ntasks {
            return Err(DeviceError::TaskOutOfRange {
                task,
                ntasks: self.ntasks,
            });
        }

        let stride = layout.stride();
        layout.split(&mut self.variable[task * stride..(task + 1) * stride])
    }

    /// Static region (read-only), slab layout and one raw slab per task.
    pub fn split_tasks(&mut self) -> Result<(StaticRegion<'_>, &SlabLayout, Vec<&mut [f64]>), DeviceError> {
        let layout = self.slab.as_ref().ok_or(DeviceError::NotAllocated("variable region"))?;
        let slabs = slabs_mut(&mut self.variable, layout.stride(), self.ntasks);

        let statics = StaticRegion {
            data: &self.static_data,
            layout: &self.static_layout,
            shells: &self.shells,
        };

        Ok((statics, layout, slabs))
    }

    /// Static region (read-only) and the split buffers of every task.
    pub fn tasks_mut(&mut self) -> Result<(StaticRegion<'_>, Vec<TaskBuffers<'_>>), DeviceError> {
        let (statics, layout, slabs) = self.split_tasks()?;

        let buffers = slabs
            .into_iter()
            .map(|s| layout.split(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((statics, buffers))
    }

    /// Static region (mutable) and the split buffers of every task.
    pub fn accumulate_mut(&mut self) -> Result<(StaticRegionMut<'_>, Vec<TaskBuffers<'_>>), DeviceError> {
        let layout = self.slab.as_ref().ok_or(DeviceError::NotAllocated("variable region"))?;

        let buffers = slabs_mut(&mut self.variable, layout.stride(), self.ntasks)
            .into_iter()
            .map(|s| layout.split(s))
            .collect::<Result<Vec<_>, _>>()?;

        let statics = StaticRegionMut {
            data: &mut self.static_data,
            layout: &self.static_layout,
        };

        Ok((statics, buffers))
    }
}

fn slabs_mut(variable: &mut [f64], stride: usize, ntasks: usize) -> Vec<&mut [f64]> {
    if stride == 0 {
        return (0..ntasks).map(|_| <&mut [f64]>::default()).collect();
    }

    variable[..ntasks * stride].chunks_mut(stride).collect()
}
