//! Full lifecycle: invite, link, stream, track, alert, cascade delete.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tether_alerts::PushBackend;
use tether_db::{create_pool, run_migrations, DbRuntimeSettings};
use tether_server::{app, AppState};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tower::ServiceExt;

async fn http(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn guardian_flow_from_invitation_to_teardown() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tether.db");
    let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    let state = AppState::new(pool, PushBackend::Disabled);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // A subject and an observer exist; the observer holds the invitation.
    let (subject, observer) = {
        let conn = state.pool.get().unwrap();
        let subject = tether_store::create_subject(&conn, "Avery", None).unwrap();
        let observer = tether_store::create_observer(&conn, "Kai", "+15550001111").unwrap();
        (subject, observer)
    };

    // Link via the invitation token.
    let (status, body) = http(
        &state,
        Request::builder()
            .method(Method::POST)
            .uri("/api/links")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "observer_id": observer.id,
                    "invitation_token": subject.invite_token,
                })
                .to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_linked"], false);

    // The subject's device starts streaming.
    let writer_url = format!("ws://{}/ws/subject/{}", addr, subject.id);
    let (mut writer, _) = connect_async(writer_url).await.unwrap();
    writer
        .send(Message::Text(
            json!({"latitude": 12.34, "longitude": 56.78}).to_string().into(),
        ))
        .await
        .unwrap();

    // Wait until the report is visible before the tracker connects.
    for _ in 0..100 {
        let view = state.registry.current_view(&subject.id).await.unwrap();
        if matches!(view, Some(ref v) if v.latitude == Some(12.34)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The observer tracks and sees the live position.
    let reader_url = format!("ws://{}/ws/track/{}", addr, subject.id);
    let (mut reader, _) = connect_async(reader_url).await.unwrap();
    let Message::Text(text) = reader.next().await.unwrap().unwrap() else {
        panic!("expected text frame");
    };
    let update: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(update["type"], "update");
    assert_eq!(update["active"], true);
    assert_eq!(update["latitude"], 12.34);
    assert_eq!(update["longitude"], 56.78);

    // The subject raises an alert; the one linked observer is notified.
    let (status, body) = http(
        &state,
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/subjects/{}/alert", subject.id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notified"], 1);
    assert_eq!(body["failed"], 0);

    // Teardown: delete the subject, cascading out of the observer's list.
    let (status, _) = http(
        &state,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/subjects/{}", subject.id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    {
        let conn = state.pool.get().unwrap();
        assert!(tether_store::get_subject(&conn, &subject.id)
            .unwrap()
            .is_none());
        let record = tether_store::get_observer(&conn, &observer.id)
            .unwrap()
            .unwrap();
        assert!(record.subjects.is_empty());
    }

    // The still-connected tracker learns the subject is gone.
    reader.send(Message::Text("next".into())).await.unwrap();
    let Message::Text(text) = reader.next().await.unwrap().unwrap() else {
        panic!("expected text frame");
    };
    let frame: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["type"], "subject_not_found");
}
