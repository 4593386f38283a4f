mod util;
use util::*;

use mesh_unzip::algs::communicator::{CommTag, Communicator, RayonComm};
use mesh_unzip::algs::exchange::{ContextState, ExchangeContext, ExchangeRegistry, VectorId};
use mesh_unzip::prelude::*;

const TAG: CommTag = CommTag(0x7100);

#[test]
fn contexts_on_two_ranks_swap_staged_values() {
    let world = RayonComm::world(2);
    let results: Vec<Vec<f64>> = std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let registry = ExchangeRegistry::new();
                    let vector = vec![comm.rank() as f64; 4];
                    let peer = 1 - comm.rank();
                    let mut ctx = ExchangeContext::open(VectorId::of(&vector), comm, &registry).unwrap();
                    let out = ctx.allocate_send_staging(3 * 8).unwrap();
                    for (i, slot) in out.iter_mut().enumerate() {
                        *slot = 10.0 * comm.rank() as f64 + i as f64;
                    }
                    ctx.allocate_receive_staging(3 * 8).unwrap();
                    ctx.post_receive(peer, TAG, 0..3).unwrap();
                    ctx.post_send(peer, TAG, 0..3).unwrap();
                    assert_eq!(ctx.outstanding(), 2);
                    assert!(matches!(ctx.received(), Err(MeshUnzipError::ExchangePending(_))));
                    ctx.wait_all().unwrap();
                    assert_eq!(ctx.state(), ContextState::Completed);
                    let got = ctx.received().unwrap().to_vec();
                    ctx.close().unwrap();
                    assert!(!registry.is_open(VectorId::of(&vector)));
                    got
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results[0], vec![10.0, 11.0, 12.0]);
    assert_eq!(results[1], vec![0.0, 1.0, 2.0]);
}

#[test]
fn unzip_refuses_a_vector_already_in_flight() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let zipped = sample(&mesh, field);

    let ctx = ExchangeContext::open(VectorId::of(&zipped), &NoComm, transfer.registry()).unwrap();
    let err = transfer.unzip(&zipped, &mut refel.scratch()).unwrap_err();
    assert!(matches!(err, MeshUnzipError::ExchangeAlreadyOpen(_)));
    drop(ctx);

    // dropping the context releases the vector
    assert_eq!(transfer.registry().open_count(), 0);
    assert!(transfer.unzip(&zipped, &mut refel.scratch()).is_ok());
}

#[test]
fn different_vectors_exchange_independently() {
    let registry = ExchangeRegistry::new();
    let a = vec![0.0; 2];
    let b = vec![0.0; 2];
    let _ca = ExchangeContext::open(VectorId::of(&a), &NoComm, &registry).unwrap();
    let _cb = ExchangeContext::open(VectorId::of(&b), &NoComm, &registry).unwrap();
    assert_eq!(registry.open_count(), 2);
}
