//! Protocol-level behavior: data sync, parameter proxying, malformed input.

mod common;

use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use adex::net::protocol::{read_message, write_frame};
use adex::net::{CoreClient, Request, Response};
use adex::{Core, CoreState, Data, Measurement};
use common::{fast_settings, spawn_core, FixedTarget, ScriptedEngine, DEADLINE};

fn test_core(limit: usize) -> Core {
    Core::new(
        Box::new(FixedTarget::new(vec![0.0, 0.0])),
        Box::new(ScriptedEngine::constant_score(limit, 1.0)),
    )
    .with_settings(fast_settings())
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_data_serves_the_tail_while_running() {
    let (addr, _server) = spawn_core(test_core(100_000)).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    client.start().await.unwrap();
    let deadline = Instant::now() + DEADLINE;
    let baseline = loop {
        let data = client.full_data().await.unwrap();
        if data.len() >= 3 {
            break data;
        }
        assert!(Instant::now() < deadline, "run never produced data");
    };

    let (tail, start) = client.partial_data(baseline.len()).await.unwrap();
    assert_eq!(start, baseline.len());
    // The tail starts exactly where the baseline ended: gluing them back
    // together reproduces a full snapshot prefix.
    let mut glued = baseline.clone();
    glued.extend(tail);
    let full = client.full_data().await.unwrap();
    assert!(glued.len() <= full.len());
    assert_eq!(full.positions[..glued.len()], glued.positions[..]);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_data_falls_back_to_state() {
    let (addr, _server) = spawn_core(test_core(10)).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    // Not running: a tail must not be served against a resettable dataset.
    let response = client.request(&Request::PartialData { start: 0 }).await.unwrap();
    assert!(matches!(response, Response::State { .. }));
    // The typed helper surfaces the fallback as an error.
    assert!(client.partial_data(0).await.is_err());

    client.start().await.unwrap();
    // Stale baseline beyond the dataset length also falls back.
    let response = client
        .request(&Request::PartialData { start: 999_999 })
        .await
        .unwrap();
    assert!(matches!(response, Response::State { .. }));

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn push_data_replaces_the_dataset() {
    let (addr, _server) = spawn_core(test_core(10)).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    let mut restored = Data::default();
    restored
        .inject_new(&[
            Measurement::new(vec![1.0, 2.0], 3.0, 0.1).with_metric("timestamp", 1.0),
            Measurement::new(vec![4.0, 5.0], 6.0, 0.2).with_metric("timestamp", 2.0),
        ])
        .unwrap();

    let length = client.push_data(restored.clone()).await.unwrap();
    assert_eq!(length, 2);
    assert_eq!(client.full_data().await.unwrap(), restored);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn push_data_rejects_inconsistent_payloads() {
    let (addr, _server) = spawn_core(test_core(10)).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    let mut good = Data::default();
    good.inject_new(&[Measurement::new(vec![1.0, 2.0], 3.0, 0.1)])
        .unwrap();
    client.push_data(good.clone()).await.unwrap();

    // More scores than positions: rejected with an exception, and the
    // previously installed dataset stays untouched.
    let mut bad = good.clone();
    bad.scores.push(9.0);
    let response = client.request(&Request::PushData { data: bad }).await.unwrap();
    assert!(matches!(response, Response::Exception { .. }));
    assert_eq!(client.full_data().await.unwrap(), good);

    // A position of the wrong width is rejected too.
    let mut bad = good.clone();
    bad.positions[0] = vec![1.0];
    let response = client.request(&Request::PushData { data: bad }).await.unwrap();
    assert!(matches!(response, Response::Exception { .. }));
    assert_eq!(client.full_data().await.unwrap(), good);

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn fragmented_frames_are_reassembled_across_polls() {
    let (addr, _server) = spawn_core(test_core(10)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = serde_json::to_vec(&Request::GetState).unwrap();

    // Prefix first, body only after several poll windows have elapsed:
    // legal TCP fragmentation must still produce exactly one reply.
    stream
        .write_all(&(body.len() as u32).to_le_bytes())
        .await
        .unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    stream.write_all(&body).await.unwrap();
    stream.flush().await.unwrap();

    let response: Response = read_message(&mut stream).await.unwrap().unwrap();
    assert!(matches!(
        response,
        Response::State {
            state: CoreState::Inactive
        }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn parameters_proxy_to_the_adaptive_engine() {
    let (addr, _server) = spawn_core(test_core(10)).await;
    let mut client = CoreClient::connect(addr.to_string()).await.unwrap();

    client
        .set_parameter("speed", serde_json::json!(5.0))
        .await
        .unwrap();
    let parameters = client.get_parameters().await.unwrap();
    assert_eq!(parameters["parameters"]["speed"]["value"], 5.0);

    // Out of the configured range: rejected, value untouched.
    let rejected = client.set_parameter("speed", serde_json::json!(50.0)).await;
    assert!(rejected.is_err());
    let parameters = client.get_parameters().await.unwrap();
    assert_eq!(parameters["parameters"]["speed"]["value"], 5.0);

    // Unknown path: rejected too.
    assert!(client
        .set_parameter("warp_factor", serde_json::json!(9.0))
        .await
        .is_err());

    client.exit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_request_gets_an_unknown_response() {
    let (addr, _server) = spawn_core(test_core(10)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = br#"{"SelfDestruct":{"countdown":3}}"#;
    stream
        .write_all(&(body.len() as u32).to_le_bytes())
        .await
        .unwrap();
    stream.write_all(body).await.unwrap();

    let response: Response = read_message(&mut stream).await.unwrap().unwrap();
    assert!(matches!(response, Response::Unknown { .. }));

    // The dispatch loop survives: a well-formed request still gets served.
    write_frame(&mut stream, &Request::GetState).await.unwrap();
    let response: Response = read_message(&mut stream).await.unwrap().unwrap();
    assert!(matches!(
        response,
        Response::State {
            state: CoreState::Inactive
        }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_reports_state_without_mutating_it() {
    let (addr, _server) = spawn_core(test_core(100_000)).await;
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

    let response = client.request(&Request::Connect).await.unwrap();
    assert!(matches!(
        response,
        Response::State {
            state: CoreState::Running
        }
    ));

    client.exit().await.unwrap();
}
