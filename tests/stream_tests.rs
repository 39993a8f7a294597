// Integration tests for the transcript stream
//
// Each test runs a real loopback WebSocket service: the stream connects to
// it over localhost, so connection lifecycle, framing, and ordering are
// exercised end to end.

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use voicewire::stream::{ConnectionState, StreamEvent, TranscriptStream};

const WAIT: Duration = Duration::from_secs(5);
const GRACE: Duration = Duration::from_millis(300);

/// Spawn a loopback transcription service. On every connection it pushes
/// the scripted fragments as text messages, then records inbound binary
/// payloads to the returned channel.
async fn spawn_service(
    fragments: Vec<String>,
) -> Result<(String, mpsc::UnboundedReceiver<Vec<u8>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);
    let (binary_tx, binary_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let mut ws = match accept_async(socket).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };

            for fragment in &fragments {
                if ws.send(Message::Text(fragment.clone())).await.is_err() {
                    break;
                }
            }

            while let Some(Ok(message)) = ws.next().await {
                if let Message::Binary(bytes) = message {
                    let _ = binary_tx.send(bytes);
                }
            }
        }
    });

    Ok((endpoint, binary_rx))
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Result<StreamEvent> {
    Ok(timeout(WAIT, events.recv())
        .await?
        .expect("event channel closed unexpectedly"))
}

#[tokio::test]
async fn test_connect_opens_and_fragments_arrive_in_order() -> Result<()> {
    let (endpoint, _binary_rx) =
        spawn_service(vec!["hello".to_string(), "world".to_string()]).await?;

    let mut stream = TranscriptStream::new(endpoint);
    assert_eq!(stream.state(), ConnectionState::Closed);

    let mut events = stream.connect();

    assert!(matches!(next_event(&mut events).await?, StreamEvent::Opened));
    assert_eq!(stream.state(), ConnectionState::Open);

    match next_event(&mut events).await? {
        StreamEvent::Fragment(text) => assert_eq!(text, "hello"),
        other => panic!("expected first fragment, got {:?}", other),
    }
    match next_event(&mut events).await? {
        StreamEvent::Fragment(text) => assert_eq!(text, "world"),
        other => panic!("expected second fragment, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_payload_goes_out_as_one_binary_message() -> Result<()> {
    let (endpoint, mut binary_rx) = spawn_service(Vec::new()).await?;

    let mut stream = TranscriptStream::new(endpoint);
    let mut events = stream.connect();
    assert!(matches!(next_event(&mut events).await?, StreamEvent::Opened));

    let payload: Vec<u8> = (0u8..45).collect();
    stream.send(payload.clone());

    let received = timeout(WAIT, binary_rx.recv()).await?.expect("payload");
    assert_eq!(received, payload);

    // Exactly one message went out
    assert!(timeout(GRACE, binary_rx.recv()).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_send_while_not_open_is_a_silent_no_op() -> Result<()> {
    let (endpoint, mut binary_rx) = spawn_service(Vec::new()).await?;

    let mut stream = TranscriptStream::new(endpoint);

    // Never connected: state is Closed, send drops the payload
    stream.send(vec![1, 2, 3]);
    assert_eq!(stream.state(), ConnectionState::Closed);

    // Connect, then close; send must drop again
    let mut events = stream.connect();
    assert!(matches!(next_event(&mut events).await?, StreamEvent::Opened));
    stream.close();
    assert_eq!(stream.state(), ConnectionState::Closed);
    stream.send(vec![4, 5, 6]);

    // The service never sees a binary message
    assert!(timeout(GRACE, binary_rx.recv()).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_connect_failure_emits_failed() -> Result<()> {
    // Nothing listens on this port; bind-then-drop reserves a dead address
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);
    drop(listener);

    let mut stream = TranscriptStream::new(endpoint);
    let mut events = stream.connect();

    match next_event(&mut events).await? {
        StreamEvent::Failed(_) => {}
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(stream.state(), ConnectionState::Failed);

    Ok(())
}

#[tokio::test]
async fn test_malformed_endpoint_fails_without_connecting() -> Result<()> {
    let mut stream = TranscriptStream::new("not a url");
    let mut events = stream.connect();

    match next_event(&mut events).await? {
        StreamEvent::Failed(reason) => assert!(reason.contains("invalid endpoint")),
        other => panic!("expected Failed, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_remote_close_emits_closed_event() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);

    tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            if let Ok(mut ws) = accept_async(socket).await {
                let _ = ws.close(None).await;
            }
        }
    });

    let mut stream = TranscriptStream::new(endpoint);
    let mut events = stream.connect();

    assert!(matches!(next_event(&mut events).await?, StreamEvent::Opened));

    match next_event(&mut events).await? {
        StreamEvent::Closed { .. } => {}
        other => panic!("expected Closed, got {:?}", other),
    }
    assert_eq!(stream.state(), ConnectionState::Closed);

    Ok(())
}

#[tokio::test]
async fn test_transport_error_and_close_are_separate_signals() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);

    tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            if let Ok(mut ws) = accept_async(socket).await {
                // A frame with a reserved opcode is a protocol violation;
                // write it raw so the handshake itself stays clean.
                let _ = ws.get_mut().write_all(&[0x8f, 0x00]).await;
                let _ = ws.get_mut().flush().await;
                tokio::time::sleep(GRACE).await;
            }
        }
    });

    let mut stream = TranscriptStream::new(endpoint);
    let mut events = stream.connect();

    assert!(matches!(next_event(&mut events).await?, StreamEvent::Opened));

    // The error arrives as its own event...
    match next_event(&mut events).await? {
        StreamEvent::TransportError(_) => {}
        other => panic!("expected TransportError, got {:?}", other),
    }

    // ...and the close follows separately; the error never stands in for it
    match next_event(&mut events).await? {
        StreamEvent::Closed { .. } => {}
        other => panic!("expected Closed after the error, got {:?}", other),
    }
    assert_eq!(stream.state(), ConnectionState::Closed);

    Ok(())
}

#[tokio::test]
async fn test_endpoint_switch_supersedes_old_connection() -> Result<()> {
    let (endpoint_a, _binary_a) = spawn_service(vec!["from-a".to_string()]).await?;
    let (endpoint_b, mut binary_b) = spawn_service(vec!["from-b".to_string()]).await?;

    let mut stream = TranscriptStream::new(endpoint_a);
    let mut old_events = stream.connect();

    assert!(matches!(next_event(&mut old_events).await?, StreamEvent::Opened));
    match next_event(&mut old_events).await? {
        StreamEvent::Fragment(text) => assert_eq!(text, "from-a"),
        other => panic!("expected fragment, got {:?}", other),
    }

    let mut events = stream.set_endpoint(endpoint_b.clone());
    assert_eq!(stream.endpoint(), endpoint_b);

    assert!(matches!(next_event(&mut events).await?, StreamEvent::Opened));
    match next_event(&mut events).await? {
        StreamEvent::Fragment(text) => assert_eq!(text, "from-b"),
        other => panic!("expected fragment, got {:?}", other),
    }

    // The new connection carries sends
    stream.send(vec![9u8; 3]);
    let received = timeout(WAIT, binary_b.recv()).await?.expect("payload");
    assert_eq!(received, vec![9u8; 3]);

    // The superseded connection never surfaces another event: its channel
    // drains (nothing new) and closes.
    let leftover = timeout(WAIT, async {
        let mut seen = Vec::new();
        while let Some(event) = old_events.recv().await {
            seen.push(event);
        }
        seen
    })
    .await?;
    assert!(
        !leftover
            .iter()
            .any(|e| matches!(e, StreamEvent::Fragment(_) | StreamEvent::Closed { .. })),
        "no fragments or closes may arrive after the switch, got {:?}",
        leftover
    );

    Ok(())
}
