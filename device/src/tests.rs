use super::*;

use basis::{Atom, BasisSet, BasisSetMap, Molecule, Shell};
use gridtask::{GridTask, Screening};
use vector3::Vector3f64;

fn system(z: f64) -> (Molecule, BasisSet) {
    let a = Vector3f64::new(0.0, 0.0, 0.0);
    let b = Vector3f64::new(0.0, 0.0, z);

    let mol = Molecule::new(vec![Atom::new(1, a), Atom::new(1, b)]);
    let basis = BasisSet::new(vec![
        Shell::new(0, false, &[1.0, 0.2], &[0.5, 0.5], a, 0),
        Shell::new(1, false, &[0.7], &[1.0], a, 0),
        Shell::new(0, false, &[1.0], &[1.0], b, 1),
    ]);

    (mol, basis)
}

fn tasks(basis: &BasisSet, npts: &[usize]) -> Vec<GridTask> {
    let map = BasisSetMap::new(basis);

    npts.iter()
        .map(|&n| {
            GridTask::new(
                0,
                vec![Vector3f64::new(0.1, 0.2, 0.3); n],
                vec![1.0; n],
                Screening::all(&map),
            )
        })
        .collect()
}

#[test]
fn test_backend_selection() {
    let host = Backend::new("host", 1000, 8).unwrap();
    assert_eq!(host.kind(), BackendKind::HostReference);
    assert_eq!(host.n_aux_queues(), 1);
    assert!(host.as_host_reference().is_some());

    let a = Backend::new("vendor_a", 1000, 4).unwrap();
    assert_eq!(a.n_aux_queues(), 4);
    assert_eq!(a.capabilities().collocation_order, CollocationOrder::ShellToTask);
    assert!(a.require_hessian().is_ok());

    let b = Backend::new("vendor_b", 1000, 4).unwrap();
    assert!(matches!(b.require_hessian(), Err(DeviceError::Capability { .. })));
    assert!(matches!(b.require_exc_gradient(), Err(DeviceError::Capability { .. })));

    assert_eq!(
        Backend::new("cpu", 1, 1),
        Err(DeviceError::UnknownBackend("cpu".to_string()))
    );
}

#[test]
fn test_buffer_view_bounds() {
    let data = vec![1.0, 2.0, 3.0, 4.0];

    let v = BufferView::new(1, 2);
    assert_eq!(v.slice(&data).unwrap(), &[2.0, 3.0]);

    let bad = BufferView::new(3, 2);
    assert_eq!(
        bad.slice(&data),
        Err(DeviceError::ViewOutOfBounds {
            offset: 3,
            len: 2,
            size: 4
        })
    );

    assert!(v.sub(1, 1).is_ok());
    assert!(v.sub(1, 2).is_err());
}

#[test]
fn test_slab_layout_fields() {
    let layout = SlabLayout::new(10, 4, 3, Requirements::integrate_den());

    assert_eq!(layout.view(Field::Bf).len, 40);
    assert_eq!(layout.view(Field::DbfX).len, 0);
    assert_eq!(layout.view(Field::D2bfZZ).len, 0);
    assert_eq!(layout.view(Field::NbeScr).len, 16);
    assert_eq!(layout.view(Field::Fmat).len, 0);
    assert_eq!(layout.stride(), 4 * 10 + 40 + 16 + 40 + 10);

    let exx = SlabLayout::new(10, 4, 6, Requirements::exx());
    assert_eq!(exx.view(Field::NbeScr).len, 24);
    assert_eq!(exx.view(Field::Gmat).len, 60);
    assert_eq!(exx.view(Field::Zmat).len, 0);

    let grad = SlabLayout::new(2, 2, 0, Requirements::exc_grad(true));
    assert_eq!(grad.view(Field::D2bfXY).len, 4);
    assert_eq!(grad.view(Field::XmatZ).len, 4);
    assert_eq!(grad.view(Field::Vgamma).len, 2);

    assert!(layout.used_words(5, 2, 0) < layout.stride());
    assert_eq!(layout.used_words(10, 4, 0), layout.stride());
}

#[test]
fn test_slab_split_is_disjoint() {
    let layout = SlabLayout::new(3, 2, 0, Requirements::exc_vxc(true));
    let mut slab = vec![0.0; layout.stride()];

    {
        let mut b = layout.split(&mut slab).unwrap();
        b.points_x.iter_mut().for_each(|x| *x = 1.0);
        b.bf.iter_mut().for_each(|x| *x = 2.0);
        b.vgamma.iter_mut().for_each(|x| *x = 3.0);
        assert_eq!(b.fmat.len(), 0);
    }

    let ones = slab.iter().filter(|x| **x == 1.0).count();
    let twos = slab.iter().filter(|x| **x == 2.0).count();
    let threes = slab.iter().filter(|x| **x == 3.0).count();
    assert_eq!((ones, twos, threes), (3, 6, 3));

    let view = layout.view(Field::Bf);
    assert!(slab[view.offset..view.end()].iter().all(|x| *x == 2.0));

    let mut short = vec![0.0; layout.stride() - 1];
    assert!(layout.split(&mut short).is_err());
}

#[test]
fn test_arena_static_lifetime() {
    let (mol, basis) = system(1.4);
    let mut arena = DeviceArena::new(1_000_000);

    assert!(arena.allocate_for(&[], Requirements::integrate_den()).is_err());

    assert!(arena.ensure_static(&mol, &basis).unwrap());
    assert!(!arena.ensure_static(&mol, &basis).unwrap());
    assert_eq!(arena.generation(), 1);

    let statics = arena.static_region();
    assert_eq!(statics.nbf(), 5);
    let sh = statics.shell(2).unwrap();
    assert_eq!(sh.center, [0.0, 0.0, 1.4]);
    assert_eq!(sh.exponents, &[1.0]);
    let sh = statics.shell(0).unwrap();
    assert_eq!(sh.coefficients, &[0.5, 0.5]);
    assert!(statics.shell(3).is_err());

    let rab = arena.static_slice(StaticField::Rab).unwrap();
    assert!((rab[1] - 1.4).abs() < 1E-14);

    let t = tasks(&basis, &[10, 20]);
    arena.allocate_for(&t, Requirements::integrate_den()).unwrap();
    assert!(arena.watermark() > 0);

    let (mol2, basis2) = system(1.5);
    assert!(arena.ensure_static(&mol2, &basis2).unwrap());
    assert_eq!(arena.watermark(), 0);
    assert_eq!(arena.generation(), 2);
}

#[test]
fn test_arena_watermark_is_monotone() {
    let (mol, basis) = system(1.4);
    let mut arena = DeviceArena::new(1_000_000);
    arena.ensure_static(&mol, &basis).unwrap();

    let mut history = Vec::new();

    for npts in [[10, 10], [40, 5], [3, 3], [50, 50], [1, 1]] {
        let t = tasks(&basis, &npts);
        arena.allocate_for(&t, Requirements::exc_vxc(false)).unwrap();
        history.push(arena.watermark());
        arena.reset_for_next_call();
        assert!(arena.slab_layout().is_err());
    }

    assert!(history.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(history[2], history[1]);
    assert!(history[3] > history[2]);
}

#[test]
fn test_arena_out_of_memory() {
    let (mol, basis) = system(1.4);

    let mut tiny = DeviceArena::new(10);
    assert!(matches!(
        tiny.ensure_static(&mol, &basis),
        Err(DeviceError::OutOfMemory { .. })
    ));

    let mut arena = DeviceArena::new(1000);
    arena.ensure_static(&mol, &basis).unwrap();
    let available = 1000 - arena.static_words();

    let t = tasks(&basis, &[100, 100]);
    let err = arena.allocate_for(&t, Requirements::exc_vxc(false)).unwrap_err();

    match err {
        DeviceError::OutOfMemory { requested, available: a } => {
            assert!(requested > a);
            assert_eq!(a, available);
        }
        e => panic!("unexpected error {}", e),
    }

    assert_eq!(arena.watermark(), 0);
}

#[test]
fn test_arena_task_buffers() {
    let (mol, basis) = system(1.4);
    let mut arena = DeviceArena::new(1_000_000);
    arena.ensure_static(&mol, &basis).unwrap();

    let t = tasks(&basis, &[4, 2]);
    arena.allocate_for(&t, Requirements::integrate_den()).unwrap();

    arena.task_buffers_mut(1).unwrap().den[0] = 7.0;
    assert_eq!(arena.task_buffers_mut(1).unwrap().den[0], 7.0);
    assert_eq!(arena.task_buffers_mut(0).unwrap().den[0], 0.0);

    assert_eq!(
        arena.task_buffers_mut(2).unwrap_err(),
        DeviceError::TaskOutOfRange { task: 2, ntasks: 2 }
    );

    let (_, buffers) = arena.tasks_mut().unwrap();
    assert_eq!(buffers.len(), 2);
}

fn ready_arena(ntasks: usize) -> DeviceArena {
    let (mol, basis) = system(1.4);
    let mut arena = DeviceArena::new(1_000_000);
    arena.ensure_static(&mol, &basis).unwrap();

    let t = tasks(&basis, &vec![4; ntasks]);
    arena.allocate_for(&t, Requirements::integrate_den()).unwrap();
    arena
}

#[test]
fn test_queue_deferred_execution() {
    let mut arena = ready_arena(6);
    let mut cm = ConcurrencyManager::new(4);

    cm.enqueue_master(|arena| {
        arena.static_slice_mut(StaticField::Nel)?[0] = 1.0;
        Ok(())
    });

    for itask in 0..6 {
        let q = cm.aux_queue_for(itask);
        cm.enqueue_aux(q, itask, move |ctx| {
            assert_eq!(ctx.task, itask);
            let nel = ctx.statics.field(StaticField::Nel)?[0];
            ctx.buffers.den[0] = nel + itask as f64;
            Ok(())
        });
    }

    assert_eq!(cm.pending_commands(), 7);
    assert_eq!(arena.static_slice(StaticField::Nel).unwrap()[0], 0.0);

    cm.sync_master_with_aux(&mut arena).unwrap();
    assert_eq!(cm.pending_commands(), 0);

    cm.enqueue_master(|arena| {
        let (mut statics, buffers) = arena.accumulate_mut()?;
        let total: f64 = buffers.iter().map(|b| b.den[0]).sum();
        statics.field_mut(StaticField::Exc)?[0] = total;
        Ok(())
    });

    let exc = cm.read_scalar(&mut arena, StaticField::Exc).unwrap();
    assert_eq!(exc, 6.0 + 15.0);

    let launches = cm.launches();
    assert_eq!(launches.master, 2);
    assert_eq!(launches.aux, vec![2, 2, 1, 1]);
    assert_eq!(launches.total_aux(), 6);
}

#[test]
fn test_queue_per_queue_fifo() {
    let mut arena = ready_arena(2);
    let mut cm = ConcurrencyManager::new(2);

    let q = cm.aux_queue_for(1);
    for k in 0..4 {
        cm.enqueue_aux(q, 1, move |ctx| {
            ctx.buffers.den[0] = 10.0 * ctx.buffers.den[0] + k as f64;
            Ok(())
        });
    }

    cm.synchronize(&mut arena).unwrap();
    assert_eq!(arena.task_buffers_mut(1).unwrap().den[0], 123.0);
}

#[test]
fn test_queue_race_is_detected() {
    let mut arena = ready_arena(2);
    let mut cm = ConcurrencyManager::new(2);

    cm.enqueue_aux(cm.aux_queue(0).unwrap(), 0, |_| Ok(()));
    cm.enqueue_aux(cm.aux_queue(1).unwrap(), 0, |_| Ok(()));

    assert_eq!(
        cm.synchronize(&mut arena),
        Err(DeviceError::QueueRace {
            task: 0,
            first: 0,
            second: 1
        })
    );

    // a barrier starts a new epoch
    cm.reset();
    cm.enqueue_aux(cm.aux_queue(0).unwrap(), 0, |_| Ok(()));
    cm.sync_master_with_aux(&mut arena).unwrap();
    cm.enqueue_aux(cm.aux_queue(1).unwrap(), 0, |_| Ok(()));
    cm.synchronize(&mut arena).unwrap();

    assert!(cm.aux_queue(2).is_err());
}

#[test]
fn test_queue_error_is_sticky() {
    let mut arena = ready_arena(2);
    let mut cm = ConcurrencyManager::new(2);

    cm.enqueue_aux(cm.aux_queue_for(0), 0, |ctx| {
        // out-of-bounds view surfaces only at the next sync
        BufferView::new(0, 1000).slice_mut(ctx.buffers.den)?;
        Ok(())
    });

    cm.enqueue_master(|arena| {
        arena.static_slice_mut(StaticField::Exc)?[0] = 5.0;
        Ok(())
    });

    assert!(!cm.has_error());
    assert!(matches!(
        cm.sync_master_with_aux(&mut arena),
        Err(DeviceError::ViewOutOfBounds { .. })
    ));

    // skipped
    assert_eq!(arena.static_slice(StaticField::Exc).unwrap()[0], 0.0);

    cm.enqueue_master(|arena| {
        arena.static_slice_mut(StaticField::Exc)?[0] = 6.0;
        Ok(())
    });
    assert!(cm.synchronize(&mut arena).is_err());
    assert_eq!(arena.static_slice(StaticField::Exc).unwrap()[0], 0.0);

    cm.reset();
    assert!(!cm.has_error());
    assert_eq!(cm.read_scalar(&mut arena, StaticField::Exc).unwrap(), 0.0);
}

#[test]
fn test_polarized_layout_replaces_closed_shell_inputs() {
    let closed = SlabLayout::new(10, 4, 0, Requirements::exc_vxc(true));
    let pol = SlabLayout::new(10, 4, 0, Requirements::exc_vxc_polarized(true));

    assert_eq!(closed.view(Field::ZmatMag).len, 0);
    assert_eq!(closed.view(Field::RhoSpin).len, 0);

    assert_eq!(pol.view(Field::NbeScr).len, 32);
    assert_eq!(pol.view(Field::ZmatMag).len, 40);
    assert_eq!(pol.view(Field::DenMagY).len, 10);
    assert_eq!(pol.view(Field::RhoSpin).len, 20);
    assert_eq!(pol.view(Field::VgammaSpin).len, 30);
    assert_eq!(pol.view(Field::Eps).len, 10);
    assert_eq!(pol.view(Field::Gamma).len, 0);
    assert_eq!(pol.view(Field::Vrho).len, 0);

    let lda = SlabLayout::new(10, 4, 0, Requirements::exc_vxc_polarized(false));
    assert_eq!(lda.view(Field::DenMagX).len, 0);
    assert_eq!(lda.view(Field::GammaSpin).len, 0);
    assert_eq!(lda.view(Field::VrhoSpin).len, 20);

    let mut slab = vec![0.0; pol.stride()];
    let b = pol.split(&mut slab).unwrap();
    assert_eq!(b.gamma_spin.len(), 30);
    assert_eq!(b.den_mag.len(), 10);
}
