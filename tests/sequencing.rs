//! Misuse detection, error propagation and the strategy plug-in surface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lockstep::{
    AllReduce, Barrier, CollectiveSet, Communicator, Error, ErrorClass, Operation, Result,
    Scatter,
};

fn add(a: i32, b: i32) -> i32 {
    a + b
}

/// A user-defined collective: max of all contributions, with a per-site
/// switch making that site's finalizer fail. Exercises the public
/// `handle_data` extension point the built-in strategies use.
struct FussyMax;

impl Operation for FussyMax {
    const NAME: &'static str = "fussy_max";
}

#[async_trait]
impl CollectiveSet<i32, (i32, bool)> for FussyMax {
    async fn set(
        comm: &Communicator,
        which: usize,
        generation: Option<u64>,
        args: (i32, bool),
    ) -> Result<i32> {
        let (value, fail) = args;
        comm.handle_data::<i32, i32, _, _>(
            Self::id(),
            which,
            generation,
            Some(move |data: &mut Vec<i32>, which: usize| data[which] = value),
            move |data: &mut Vec<i32>, _: &mut bool, _: usize| {
                if fail {
                    return Err(Error::Internal("site refused to finalize".to_string()));
                }
                Ok(data.iter().copied().max().unwrap_or(i32::MIN))
            },
            None,
        )
        .await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn custom_strategy_plugs_in_like_a_built_in() {
    let comm = Arc::new(Communicator::named("custom", 3).unwrap());

    let mut sites = Vec::new();
    for (which, value) in [4, 9, 2].into_iter().enumerate() {
        sites.push(comm.spawn_set_result::<FussyMax, i32, _>(which, None, (value, false)));
    }
    for site in sites {
        assert_eq!(site.await.unwrap().unwrap(), 9);
    }
    assert_eq!(comm.generation(), 2);
}

// A failing finalizer resolves only its own site's future; the collective
// still completes and the communicator advances.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn finalizer_error_is_contained_to_its_site() {
    let comm = Arc::new(Communicator::named("contained", 3).unwrap());

    let zero = comm.spawn_set_result::<FussyMax, i32, _>(0, None, (4, false));
    let one = comm.spawn_set_result::<FussyMax, i32, _>(1, None, (9, true));
    let two = comm.spawn_set_result::<FussyMax, i32, _>(2, None, (2, false));

    assert_eq!(zero.await.unwrap().unwrap(), 9);
    let err = one.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert_eq!(two.await.unwrap().unwrap(), 9);
    assert_eq!(comm.generation(), 2);

    // The failure left no residue; the next generation runs cleanly.
    let mut sites = Vec::new();
    for which in 0..3 {
        sites.push(comm.spawn_set_result::<FussyMax, i32, _>(which, None, (which as i32, false)));
    }
    for site in sites {
        assert_eq!(site.await.unwrap().unwrap(), 2);
    }
}

// Mixing operation kinds within a generation is rejected; the generation
// recovers once the remaining sites arrive with the active kind.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn operation_mixing_is_rejected_and_recoverable() {
    let comm = Arc::new(Communicator::named("mixed", 3).unwrap());

    let zero = comm.spawn_set_result::<AllReduce, i32, _>(0, None, (10, add));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = comm
        .set_result::<Barrier, (), _>(1, None, ())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Sequencing);
    assert!(matches!(
        err,
        Error::OperationMismatch {
            requested: "barrier",
            ongoing: "all_reduce",
        }
    ));
    assert!(!zero.is_finished());

    let one = comm.spawn_set_result::<AllReduce, i32, _>(1, None, (20, add));
    let two = comm.spawn_set_result::<AllReduce, i32, _>(2, None, (12, add));
    assert_eq!(zero.await.unwrap().unwrap(), 42);
    assert_eq!(one.await.unwrap().unwrap(), 42);
    assert_eq!(two.await.unwrap().unwrap(), 42);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_arrival_is_rejected_without_corrupting_the_generation() {
    let comm = Arc::new(Communicator::named("dup", 2).unwrap());

    let zero = comm.spawn_set_result::<AllReduce, i32, _>(0, None, (5, add));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = comm
        .set_result::<AllReduce, i32, _>(0, None, (5, add))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RepeatedArrival {
            which: 0,
            generation: 1,
        }
    ));

    let one = comm.spawn_set_result::<AllReduce, i32, _>(1, None, (7, add));
    assert_eq!(zero.await.unwrap().unwrap(), 12);
    assert_eq!(one.await.unwrap().unwrap(), 12);
    assert_eq!(comm.generation(), 2);
}

#[tokio::test]
async fn out_of_range_site_fails_synchronously() {
    let comm = Communicator::named("range", 3).unwrap();
    let err = comm
        .set_result::<AllReduce, i32, _>(7, None, (1, add))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SiteOutOfRange {
            which: 7,
            num_sites: 3,
        }
    ));
    assert_eq!(err.class(), ErrorClass::Arrival);
}

#[tokio::test]
async fn explicit_generation_zero_is_invalid() {
    let comm = Communicator::named("genzero", 1).unwrap();
    let err = comm
        .set_result::<Barrier, (), _>(0, Some(0), ())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidGeneration));
}

#[tokio::test]
async fn scatter_payload_of_wrong_length_is_rejected() {
    let comm = Communicator::named("short", 3).unwrap();
    let err = comm
        .set_result::<Scatter, i32, _>(0, None, vec![1, 2])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CountMismatch {
            expected: 3,
            got: 2,
        }
    ));
}
