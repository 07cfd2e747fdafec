//! Drive an agent end to end over a loopback websocket

use async_net::TcpStream;
use async_tungstenite::client_async;
use async_tungstenite::tungstenite::Message;
use futures::{SinkExt, StreamExt};
use program_executor::{LifecycleTimeouts, LocalDirFetcher, Program, ProgramStatus};
use std::sync::Arc;
use std::time::Duration;
use task_supervisor::{
    Agent, AgentServer, Error, Request, Response, SledStore, TaskRef, Transport, WsTransport,
};
use tempfile::TempDir;

async fn start_agent(root: &TempDir) -> String {
    let store = Arc::new(SledStore::open(root.path().join("store")).unwrap());
    let timeouts = LifecycleTimeouts {
        start_confirm: Duration::from_millis(200),
        stop_timeout: Duration::from_secs(3),
        poll_interval: Duration::from_millis(20),
    };
    let agent = Agent::new(
        root.path().join("agent"),
        timeouts,
        store,
        Arc::new(LocalDirFetcher::new(root.path())),
    )
    .await
    .unwrap();

    let server = AgentServer::bind("127.0.0.1:0", Arc::new(agent))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    smol::spawn(server.serve()).detach();
    addr
}

#[smol_potat::test]
async fn test_lifecycle_over_websocket() {
    let root = TempDir::new().unwrap();
    let addr = start_agent(&root).await;
    let transport = WsTransport::new();
    let task = TaskRef::new("py_test", "sleeper", 0);

    let program = Program::new("py_test", "sleeper", 0, "sleep", vec!["30".into()]);
    let installed = transport
        .send(&addr, Request::Install { program: program.clone() })
        .await
        .unwrap()
        .into_program()
        .unwrap();
    assert_eq!(installed.status, ProgramStatus::Stopped);

    let err = transport
        .send(&addr, Request::Install { program })
        .await
        .unwrap()
        .into_program()
        .unwrap_err();
    match err {
        Error::Remote(info) => assert_eq!(info.code, "already_installed"),
        other => panic!("unexpected {other:?}"),
    }

    let started = transport
        .send(&addr, Request::Start { task: task.clone() })
        .await
        .unwrap()
        .into_program()
        .unwrap();
    assert_eq!(started.status, ProgramStatus::Running);

    let shown = transport
        .send(&addr, Request::Show { task: task.clone() })
        .await
        .unwrap()
        .into_program()
        .unwrap();
    assert_eq!(shown.pid, started.pid);
    assert_eq!(shown.status, ProgramStatus::Running);

    let listed = transport
        .send(&addr, Request::List)
        .await
        .unwrap()
        .into_programs()
        .unwrap();
    assert_eq!(listed.len(), 1);

    transport
        .send(&addr, Request::Stop { task: task.clone() })
        .await
        .unwrap()
        .into_program()
        .unwrap();
    transport
        .send(&addr, Request::Cleanup { task: task.clone() })
        .await
        .unwrap()
        .into_program()
        .unwrap();

    let err = transport
        .send(&addr, Request::Show { task })
        .await
        .unwrap()
        .into_program()
        .unwrap_err();
    assert!(matches!(err, Error::Remote(ref info) if info.code == "not_installed"));
}

#[smol_potat::test]
async fn test_malformed_request_gets_error_response() {
    let root = TempDir::new().unwrap();
    let addr = start_agent(&root).await;

    let stream = TcpStream::connect(&addr).await.unwrap();
    let (mut ws, _) = client_async(format!("ws://{addr}/"), stream).await.unwrap();

    ws.send(Message::Text("{\"type\":\"Explode\"}".into()))
        .await
        .unwrap();
    let reply = match ws.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str::<Response>(&text).unwrap(),
        other => panic!("unexpected {other:?}"),
    };
    match reply {
        Response::Error { error } => assert_eq!(error.code, "protocol_error"),
        other => panic!("unexpected {other:?}"),
    }

    // the connection stays usable after a bad message
    let list = serde_json::to_string(&Request::List).unwrap();
    ws.send(Message::Text(list.into())).await.unwrap();
    assert!(matches!(ws.next().await, Some(Ok(Message::Text(_)))));
}

#[smol_potat::test]
async fn test_unreachable_agent_is_transport_error() {
    let transport = WsTransport::new();
    let result = transport.send("127.0.0.1:1", Request::List).await;
    assert!(matches!(result, Err(Error::Io(_))));
}
