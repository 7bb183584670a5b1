//! End-to-end lifecycle scenarios: a real core loop on a TCP socket,
//! driven through the typed client.

mod common;

use std::time::Instant;

use adex::net::{CoreClient, Request, Response};
use adex::{Core, CoreState, Measurement};
use common::{fast_settings, spawn_core, FixedTarget, ScriptedEngine, DEADLINE};

#[tokio::test(flavor = "multi_thread")]
async fn five_iterations_with_fixed_engines() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0])),
        Box::new(ScriptedEngine::constant_score(5, 1.0)),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    assert_eq!(client.start().await.unwrap(), CoreState::Starting);

    let deadline = Instant::now() + DEADLINE;
    let data = loop {
        let data = client.full_data().await.unwrap();
        if data.len() >= 5 {
            break data;
        }
        assert!(Instant::now() < deadline, "never reached 5 observations");
    };

    // The backend is exhausted after 5 measurements, so the length is stable.
    assert_eq!(data.len(), 5);
    assert_eq!(data.scores, vec![1.0; 5]);
    assert!(data.positions.iter().all(|p| p == &vec![0.0, 0.0]));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(client.full_data().await.unwrap().len(), 5);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_bypasses_both_engines() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![9.0, 9.0])),
        Box::new(ScriptedEngine::constant_score(100, 7.0)),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    let p1 = vec![1.0, 1.0];
    let p2 = vec![2.0, 2.0];
    let m1 = Measurement::new(p1.clone(), 10.0, 0.1);
    let m2 = Measurement::new(p2.clone(), 20.0, 0.2);
    let pending = client
        .replay(vec![p1.clone(), p2.clone()], vec![m1, m2])
        .await
        .unwrap();
    assert_eq!(pending, 2);

    client.start().await.unwrap();

    let deadline = Instant::now() + DEADLINE;
    let data = loop {
        let data = client.full_data().await.unwrap();
        if data.len() >= 3 {
            break data;
        }
        assert!(Instant::now() < deadline, "replay never consumed");
    };

    // Replayed observations land first, verbatim and in order; the run then
    // falls back to the adaptive engine and live backend.
    assert_eq!(data.positions[0], p1);
    assert_eq!(data.scores[0], 10.0);
    assert_eq!(data.positions[1], p2);
    assert_eq!(data.scores[1], 20.0);
    assert_eq!(data.positions[2], vec![9.0, 9.0]);
    assert_eq!(data.scores[2], 7.0);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_acquisition_pauses_after_two_iterations() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0]).failing_on(3)),
        Box::new(ScriptedEngine::constant_score(100, 1.0)),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    client.start().await.unwrap();

    // The fault surfaces on a state poll, not as a crash.
    let deadline = Instant::now() + DEADLINE;
    let message = loop {
        match client.get_state().await.unwrap() {
            Response::Exception { message, .. } => break message,
            Response::State { .. } => {}
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(Instant::now() < deadline, "exception never surfaced");
    };
    assert!(message.contains("acquisition diverged"));

    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Response::State {
            state: CoreState::Paused,
        } = client.get_state().await.unwrap()
        {
            break;
        }
        assert!(Instant::now() < deadline, "run never paused");
    }

    // Exactly the two successful iterations landed.
    assert_eq!(client.full_data().await.unwrap().len(), 2);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_acquisition_pauses_instead_of_wedging() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0]).panicking_on(3)),
        Box::new(ScriptedEngine::constant_score(100, 1.0)),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    client.start().await.unwrap();

    // A panic inside the engine pauses the run exactly like a returned
    // error: the thread survives, the fault is queued, the state resolves.
    let deadline = Instant::now() + DEADLINE;
    let message = loop {
        match client.get_state().await.unwrap() {
            Response::Exception { message, .. } => break message,
            Response::State { state } => {
                assert_ne!(state, CoreState::Inactive, "run died instead of pausing");
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(Instant::now() < deadline, "panic never surfaced");
    };
    assert!(message.contains("acquisition model corrupted"));

    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Response::State {
            state: CoreState::Paused,
        } = client.get_state().await.unwrap()
        {
            break;
        }
        assert!(Instant::now() < deadline, "run never paused");
    }
    assert_eq!(client.full_data().await.unwrap().len(), 2);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent_and_resets_the_dataset() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0])),
        Box::new(ScriptedEngine::constant_score(1000, 1.0)),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    // Stop while Inactive: no-op, not an error.
    client.stop().await.unwrap();
    assert!(matches!(
        client.get_state().await.unwrap(),
        Response::State {
            state: CoreState::Inactive
        }
    ));

    client.start().await.unwrap();
    let deadline = Instant::now() + DEADLINE;
    while client.full_data().await.unwrap().is_empty() {
        assert!(Instant::now() < deadline, "run never produced data");
    }

    // Stop blocks until the worker joins; afterwards the dataset is reset
    // and stays put.
    client.stop().await.unwrap();
    assert!(matches!(
        client.get_state().await.unwrap(),
        Response::State {
            state: CoreState::Inactive
        }
    ));
    let len = client.full_data().await.unwrap().len();
    assert_eq!(len, 0);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(client.full_data().await.unwrap().len(), len);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn double_start_is_safe() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0])),
        Box::new(ScriptedEngine::constant_score(1000, 1.0)),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    client.start().await.unwrap();
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Response::State {
            state: CoreState::Running,
        } = client.get_state().await.unwrap()
        {
            break;
        }
        assert!(Instant::now() < deadline, "run never started");
    }

    assert_eq!(client.start().await.unwrap(), CoreState::Running);
    assert!(matches!(
        client.get_state().await.unwrap(),
        Response::State {
            state: CoreState::Running
        }
    ));

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_and_resume_roundtrip() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0])),
        Box::new(ScriptedEngine::constant_score(100_000, 1.0)),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    client.start().await.unwrap();
    client.pause().await.unwrap();
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Response::State {
            state: CoreState::Paused,
        } = client.get_state().await.unwrap()
        {
            break;
        }
        assert!(Instant::now() < deadline, "run never paused");
    }

    // Start from Paused resumes instead of restarting.
    assert_eq!(client.start().await.unwrap(), CoreState::Resuming);
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Response::State {
            state: CoreState::Running,
        } = client.get_state().await.unwrap()
        {
            break;
        }
        assert!(Instant::now() < deadline, "run never resumed");
    }

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn measure_queues_a_forced_position() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0])),
        Box::new(ScriptedEngine::new(1000, |p| {
            Measurement::new(p.clone(), p[0], 0.0)
        })),
    )
    .with_settings(fast_settings());
    let (addr, _server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    client.measure(vec![7.0, 7.0]).await.unwrap();
    client.start().await.unwrap();

    let deadline = Instant::now() + DEADLINE;
    loop {
        let data = client.full_data().await.unwrap();
        if data.positions.iter().any(|p| p == &vec![7.0, 7.0]) {
            let i = data
                .positions
                .iter()
                .position(|p| p == &vec![7.0, 7.0])
                .unwrap();
            assert_eq!(data.scores[i], 7.0);
            break;
        }
        assert!(Instant::now() < deadline, "forced position never measured");
    }

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn exit_terminates_the_core_loop() {
    let core = Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0])),
        Box::new(ScriptedEngine::constant_score(10, 1.0)),
    )
    .with_settings(fast_settings());
    let (addr, server) = spawn_core(core).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    assert_eq!(client.exit().await.unwrap(), CoreState::Exiting);
    assert!(server.await.unwrap().is_ok());

    // The socket is gone; a fresh request cannot be serviced.
    assert!(client.request(&Request::GetState).await.is_err());
}
