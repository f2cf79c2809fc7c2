mod support;

use lance_client::frame::{build_control_frame, ControlCommand};
use lance_client::{ClientConfig, LanceClient};
use support::{read_frame, write_frame, ScriptedServer};

#[tokio::test]
async fn create_topic_returns_assigned_id() {
    let server = ScriptedServer::start(|mut stream| async move {
        let (header, body) = read_frame(&mut stream).await;
        assert_eq!(header.command(), Some(ControlCommand::CreateTopic));
        assert_eq!(body, b"prices");

        let response_body = serde_json::to_vec(&serde_json::json!({ "topic_id": 3 })).unwrap();
        let response = build_control_frame(ControlCommand::TopicResponse, &response_body, 0);
        write_frame(&mut stream, &response).await;
    })
    .await;

    let config = ClientConfig::default().with_host("127.0.0.1").with_port(
        server
            .address()
            .rsplit_once(':')
            .unwrap()
            .1
            .parse()
            .unwrap(),
    );
    let client = LanceClient::connect(config).await.unwrap();

    let metadata = client.create_topic("prices").await.unwrap();
    assert_eq!(metadata["topic_id"], 3);

    client.close().await;
}

#[tokio::test]
async fn create_topic_surfaces_already_exists_error() {
    let server = ScriptedServer::start(|mut stream| async move {
        let (header, _body) = read_frame(&mut stream).await;
        assert_eq!(header.command(), Some(ControlCommand::CreateTopic));

        let response_body = serde_json::to_vec(&serde_json::json!({
            "code": 0x11,
            "message": "topic 'prices' already exists",
        }))
        .unwrap();
        let response = build_control_frame(ControlCommand::ErrorResponse, &response_body, 0);
        write_frame(&mut stream, &response).await;
    })
    .await;

    let port: u16 = server.address().rsplit_once(':').unwrap().1.parse().unwrap();
    let client = LanceClient::connect(ClientConfig::default().with_port(port)).await.unwrap();

    let err = client.create_topic("prices").await.unwrap_err();
    assert!(matches!(err, lance_client::LanceError::TopicAlreadyExists(_)));

    client.close().await;
}

#[tokio::test]
async fn list_topics_accepts_wrapped_object() {
    let server = ScriptedServer::start(|mut stream| async move {
        let (header, _body) = read_frame(&mut stream).await;
        assert_eq!(header.command(), Some(ControlCommand::ListTopics));

        let response_body = serde_json::to_vec(&serde_json::json!({
            "topics": [{"id": 1, "name": "prices"}, {"id": 2, "name": "trades"}],
        }))
        .unwrap();
        let response = build_control_frame(ControlCommand::TopicResponse, &response_body, 0);
        write_frame(&mut stream, &response).await;
    })
    .await;

    let port: u16 = server.address().rsplit_once(':').unwrap().1.parse().unwrap();
    let client = LanceClient::connect(ClientConfig::default().with_port(port)).await.unwrap();

    let topics = client.list_topics().await.unwrap();
    assert_eq!(topics.len(), 2);

    client.close().await;
}
