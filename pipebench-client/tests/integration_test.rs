use pipebench::{BatchBuilder, BatchExecutor, OpOutcome};
use pipebench_client::mock::MockServer;
use pipebench_client::{ClientBuilder, ClientError, Command, RespValue, StoreClient};
use std::time::Duration;

fn builder() -> ClientBuilder {
    ClientBuilder::new()
        .max_connections(8)
        .min_idle_connections(2)
        .connect_timeout(Duration::from_secs(2))
        .read_timeout(Duration::from_secs(2))
        .write_timeout(Duration::from_secs(2))
        .pool_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_batch_executes_all_operations() {
    let server = MockServer::start().await.unwrap();
    let client = builder().build(server.addr()).await.unwrap();

    let mut batch_builder = BatchBuilder::new(3);
    let batch = batch_builder.build_at(1234);

    let outcomes = client.execute(batch).await.unwrap();
    assert_eq!(outcomes, vec![OpOutcome::Success; 4]);

    assert_eq!(server.get("k3-1234").as_deref(), Some("value"));
    assert_eq!(
        server.hash_field("k3-1234:hash", "field2").as_deref(),
        Some("value2")
    );
    assert_eq!(server.list("k3-1234:list"), ["item3", "item2", "item1"]);
}

#[tokio::test]
async fn test_error_replies_become_operation_failures() {
    let server = MockServer::builder()
        .fail_command("HSET")
        .start()
        .await
        .unwrap();
    let client = builder().build(server.addr()).await.unwrap();

    let mut batch_builder = BatchBuilder::new(0);
    let outcomes = client.execute(batch_builder.build_at(1)).await.unwrap();

    let failures: Vec<bool> = outcomes.iter().map(OpOutcome::is_failure).collect();
    assert_eq!(failures, [false, true, false, false]);
}

#[tokio::test]
async fn test_hang_up_rejects_batch() {
    let server = MockServer::builder().hang_up().start().await.unwrap();
    let client = builder().min_idle_connections(0).build(server.addr()).await.unwrap();

    let mut batch_builder = BatchBuilder::new(0);
    let result = client.execute(batch_builder.build_at(1)).await;

    assert!(matches!(result, Err(ClientError::ConnectionClosed)) || matches!(result, Err(ClientError::Io(_))));
}

#[tokio::test]
async fn test_retries_reconnect_after_failure() {
    let server = MockServer::builder().hang_up().start().await.unwrap();
    let client = builder()
        .min_idle_connections(0)
        .max_retries(2)
        .build(server.addr())
        .await
        .unwrap();

    let mut batch_builder = BatchBuilder::new(0);
    assert!(client.execute(batch_builder.build_at(1)).await.is_err());

    // One connection per attempt
    assert_eq!(server.connections(), 3);
}

#[tokio::test]
async fn test_unreachable_store_builds_but_rejects() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = builder().build(addr).await.unwrap();

    let mut batch_builder = BatchBuilder::new(0);
    assert!(client.execute(batch_builder.build_at(1)).await.is_err());
}

#[tokio::test]
async fn test_invalid_address() {
    let result = StoreClient::connect("not an address").await;
    assert!(matches!(result, Err(ClientError::InvalidAddress(_))));
}

#[tokio::test]
async fn test_authentication() {
    let server = MockServer::builder()
        .password("hunter2")
        .start()
        .await
        .unwrap();

    let client = builder().password("hunter2").build(server.addr()).await.unwrap();
    client.ping().await.unwrap();

    let unauthenticated = builder().min_idle_connections(0).build(server.addr()).await.unwrap();
    let replies = unauthenticated
        .pipeline(&[Command::new("GET").arg("k")])
        .await
        .unwrap();
    assert!(matches!(&replies[0], Err(message) if message.starts_with("NOAUTH")));

    let wrong = builder()
        .min_idle_connections(0)
        .password("nope")
        .build(server.addr())
        .await
        .unwrap();
    assert!(matches!(wrong.ping().await, Err(ClientError::Auth(_))));
}

#[tokio::test]
async fn test_generic_pipeline() {
    let server = MockServer::start().await.unwrap();
    let client = builder().build(server.addr()).await.unwrap();

    let replies = client
        .pipeline(&[
            Command::new("SET").arg("a").arg("1"),
            Command::new("GET").arg("a"),
            Command::new("GET").arg("missing"),
            Command::new("NOPE"),
        ])
        .await
        .unwrap();

    assert_eq!(replies[0], Ok(RespValue::SimpleString("OK".to_string())));
    assert_eq!(replies[1], Ok(RespValue::BulkString(Some("1".to_string()))));
    assert_eq!(replies[2], Ok(RespValue::BulkString(None)));
    assert!(replies[3].is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_share_pool() {
    let server = MockServer::start().await.unwrap();
    let client = builder().build(server.addr()).await.unwrap();

    let mut handles = Vec::new();
    for worker in 0..32 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut batch_builder = BatchBuilder::new(worker);
            for _ in 0..10 {
                let outcomes = client.execute(batch_builder.next_batch()).await.unwrap();
                assert_eq!(outcomes.len(), 4);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(server.string_keys(), 320);
    assert!(server.connections() <= 8);
    assert_eq!(client.pool_stats().in_use, 0);
}

#[tokio::test]
async fn test_close_rejects_further_batches() {
    let server = MockServer::start().await.unwrap();
    let client = builder().build(server.addr()).await.unwrap();
    client.ping().await.unwrap();

    client.close();

    let mut batch_builder = BatchBuilder::new(0);
    assert!(matches!(
        client.execute(batch_builder.build_at(1)).await,
        Err(ClientError::PoolClosed)
    ));
}
