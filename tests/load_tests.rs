mod common;

use common::{payload_bytes, test_id, Client, GetReply, TestServer};

#[cfg(test)]
mod pipelining_tests {
    use super::*;

    #[tokio::test]
    async fn responses_arrive_in_request_order() {
        let server = TestServer::start(0).await;
        let mut client = Client::connect_ready(server.addr).await;
        let ids: Vec<[u8; 32]> = (0..3u8).map(test_id).collect();

        for (seed, id) in ids.iter().enumerate() {
            client
                .upload(id, b'a', &payload_bytes(seed as u8, 2048))
                .await;
        }

        // Three GETs back to back before reading anything.
        for id in &ids {
            client.send_get(b'a', id).await;
        }
        for (seed, id) in ids.iter().enumerate() {
            match client.read_reply().await {
                GetReply::Hit {
                    id: echoed,
                    payload,
                    ..
                } => {
                    assert_eq!(&echoed, id);
                    assert_eq!(payload, payload_bytes(seed as u8, 2048));
                }
                GetReply::Miss { .. } => panic!("unexpected miss"),
            }
        }
    }

    #[tokio::test]
    async fn hits_and_misses_stay_ordered() {
        let server = TestServer::start(0).await;
        let mut client = Client::connect_ready(server.addr).await;
        let cached = test_id(0x10);
        let absent = test_id(0x20);

        client.upload(&cached, b'a', b"present").await;

        client.send_get(b'a', &cached).await;
        client.send_get(b'a', &absent).await;
        client.send_get(b'a', &cached).await;

        assert_eq!(client.read_reply().await.payload(), b"present");
        assert!(client.read_reply().await.is_miss());
        assert_eq!(client.read_reply().await.payload(), b"present");
    }

    #[tokio::test]
    async fn puts_interleave_with_pipelined_gets() {
        let server = TestServer::start(0).await;
        let mut client = Client::connect_ready(server.addr).await;
        let first = test_id(0x30);
        let second = test_id(0x31);

        client.upload(&first, b'a', b"uploaded first").await;
        client.send_get(b'a', &first).await;
        client.upload(&second, b'a', b"uploaded second").await;
        client.send_get(b'a', &second).await;

        assert_eq!(client.read_reply().await.payload(), b"uploaded first");
        assert_eq!(client.read_reply().await.payload(), b"uploaded second");
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_connections_upload_and_read_back() {
        let server = TestServer::start(16).await;
        let addr = server.addr;

        let mut tasks = Vec::new();
        for seed in 0..8u8 {
            tasks.push(tokio::spawn(async move {
                let mut client = Client::connect_ready(addr).await;
                let id = test_id(seed);
                let payload = payload_bytes(seed, 16 * 1024);
                client.upload(&id, b'a', &payload).await;
                assert_eq!(client.get(b'a', &id).await.payload(), &payload[..]);
                client.quit().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Every artifact is visible to a fresh connection afterwards.
        let mut reader = Client::connect_ready(addr).await;
        for seed in 0..8u8 {
            let id = test_id(seed);
            assert_eq!(
                reader.get(b'a', &id).await.payload(),
                &payload_bytes(seed, 16 * 1024)[..]
            );
        }
    }

    #[tokio::test]
    async fn writers_racing_on_one_id_leave_a_whole_artifact() {
        let server = TestServer::start(0).await;
        let addr = server.addr;
        let id = test_id(0x77);

        let mut tasks = Vec::new();
        for seed in 0..4u8 {
            tasks.push(tokio::spawn(async move {
                let mut client = Client::connect_ready(addr).await;
                // Same id, distinct uniform payloads.
                client.upload(&id, b'a', &vec![seed; 8 * 1024]).await;
                client.quit().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Last writer wins, and the survivor is never a torn mix.
        let mut reader = Client::connect_ready(addr).await;
        let reply = reader.get(b'a', &id).await;
        let payload = reply.payload();
        assert_eq!(payload.len(), 8 * 1024);
        let first = payload[0];
        assert!(payload.iter().all(|&b| b == first));
    }

    #[tokio::test]
    async fn many_sequential_requests_on_one_connection() {
        let server = TestServer::start(8).await;
        let mut client = Client::connect_ready(server.addr).await;

        for round in 0..50u8 {
            let id = test_id(round);
            let payload = payload_bytes(round, 1024);
            client.upload(&id, b'a', &payload).await;
            assert_eq!(client.get(b'a', &id).await.payload(), &payload[..]);
        }
        assert!(server.server.memory().len() <= 8);
    }
}
