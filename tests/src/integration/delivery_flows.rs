//! # Delivery Flows
//!
//! Retries, dead letters, expiry and cancellation with live workers.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use dm_02_message_router::{
        DeliveryContext, FnMessageHandler, HandlerError, MessageRouterApi,
    };
    use shared_types::{AgentMessage, MessageStatus, MessageType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const TRUST_A_TO_B: &str = "division-a>division-b:request|event|response";

    #[tokio::test]
    async fn test_fail_fail_succeed_is_delivered_on_third_attempt() {
        let mesh = TestMesh::start(&[TRUST_A_TO_B]);
        let (calls, handler) = failing_times(2);
        handle_requests(&mesh, handler);

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .max_retries(3)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();
        mesh.services.router.send(message).await.unwrap();

        assert_eq!(
            mesh.wait_for(&id, MessageStatus::Delivered).await,
            Some(MessageStatus::Delivered)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let receipts = mesh.services.router.receipts(&id);
        let counts: Vec<u32> = receipts.iter().map(|r| r.retry_count()).collect();
        assert_eq!(counts, vec![0, 1, 2]);
        assert_eq!(receipts.last().map(|r| r.status()), Some(MessageStatus::Delivered));

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_always_failing_handler_ends_in_dead_letters() {
        let mesh = TestMesh::start(&[TRUST_A_TO_B]);
        let (calls, handler) = failing_times(usize::MAX);
        handle_requests(&mesh, handler);

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .max_retries(2)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();
        mesh.services.router.send(message).await.unwrap();

        assert_eq!(
            mesh.wait_for(&id, MessageStatus::Expired).await,
            Some(MessageStatus::Expired)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let receipts = mesh.services.router.receipts(&id);
        let counts: Vec<u32> = receipts.iter().map(|r| r.retry_count()).collect();
        assert_eq!(counts, vec![0, 1, 2]);
        assert!(receipts.iter().all(|r| r.retry_count() <= 2));

        let mut dead = Vec::new();
        for _ in 0..100 {
            dead = mesh.services.router.dead_letters("division-b").await.unwrap();
            if !dead.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.message_id(), id);

        // Give the workers time to prove there is no fourth attempt.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_expired_message_never_reaches_handler() {
        let mesh = TestMesh::start(&[TRUST_A_TO_B]);
        let (calls, handler) = failing_times(0);
        handle_requests(&mesh, handler);

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .timestamp(now() - 10_000)
            .ttl_secs(5)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();

        let receipt = mesh.services.router.send(message).await.unwrap();
        assert_eq!(receipt.status(), MessageStatus::Expired);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mesh.services.router.get_status(&id), Some(MessageStatus::Expired));

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_ttl_elapsing_during_backoff_expires_message() {
        let mut config = fast_config(&[TRUST_A_TO_B]);
        config.router.backoff_base = Duration::from_millis(1_500);
        config.router.backoff_cap = Duration::from_millis(1_500);
        let mesh = TestMesh::start_with(config);
        let (calls, handler) = failing_times(usize::MAX);
        handle_requests(&mesh, handler);

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .ttl_secs(1)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();
        mesh.services.router.send(message).await.unwrap();

        assert_eq!(
            mesh.wait_for(&id, MessageStatus::Expired).await,
            Some(MessageStatus::Expired)
        );
        let last = mesh.services.router.receipts(&id).pop().unwrap();
        assert_eq!(last.error_message(), Some("ttl_expired"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_running_handler() {
        let mesh = TestMesh::start(&[TRUST_A_TO_B]);
        let started = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&started);
        let handler = FnMessageHandler::new(move |_msg: AgentMessage, ctx: DeliveryContext| {
            s.fetch_add(1, Ordering::SeqCst);
            async move {
                ctx.cancellation.cancelled().await;
                Err::<(), _>(HandlerError::Cancelled)
            }
        });
        handle_requests(&mesh, Arc::new(handler));

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();
        mesh.services.router.send(message).await.unwrap();

        for _ in 0..100 {
            if started.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(mesh.services.router.cancel(&id).await);

        assert_eq!(
            mesh.wait_for(&id, MessageStatus::Expired).await,
            Some(MessageStatus::Expired)
        );
        let last = mesh.services.router.receipts(&id).pop().unwrap();
        assert_eq!(last.error_message(), Some("cancelled"));
        assert_eq!(started.load(Ordering::SeqCst), 1);

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_replayed_dead_letter_is_delivered() {
        let mesh = TestMesh::start(&[TRUST_A_TO_B]);
        let (calls, handler) = failing_times(1);
        handle_requests(&mesh, handler);

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .max_retries(0)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();
        mesh.services.router.send(message).await.unwrap();
        assert_eq!(
            mesh.wait_for(&id, MessageStatus::Expired).await,
            Some(MessageStatus::Expired)
        );

        let mut replay = None;
        for _ in 0..100 {
            match mesh.services.router.replay_dead_letter("division-b", &id).await {
                Ok(receipt) => {
                    replay = Some(receipt);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        let replay = replay.unwrap();
        assert_ne!(replay.message_id(), id);

        assert_eq!(
            mesh.wait_for(replay.message_id(), MessageStatus::Delivered).await,
            Some(MessageStatus::Delivered)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(mesh.services.router.get_status(&id), Some(MessageStatus::Expired));

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_priority_orders_backlog() {
        let mut config = fast_config(&[]);
        config.router.workers_per_division = 1;
        let mesh = TestMesh::start_with(config);

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let o = Arc::clone(&order);
        let gate = Arc::new(tokio::sync::Notify::new());
        let g = Arc::clone(&gate);
        let handler = FnMessageHandler::new(move |msg: AgentMessage, _ctx: DeliveryContext| {
            let o = Arc::clone(&o);
            let g = Arc::clone(&g);
            async move {
                if msg.metadata.get("blocker").is_some() {
                    g.notified().await;
                } else {
                    o.lock().push(msg.priority);
                }
                Ok::<(), HandlerError>(())
            }
        });
        handle_requests(&mesh, Arc::new(handler));

        // Occupy the single worker while the backlog builds up.
        let blocker = mesh
            .message("division-c", "division-c", MessageType::Request)
            .metadata("blocker", serde_json::Value::Bool(true))
            .build(now())
            .unwrap();
        let blocker_id = blocker.message_id().to_string();
        mesh.services.router.send(blocker).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut ids = Vec::new();
        for priority in [1u8, 9, 5] {
            let message = mesh
                .message("division-c", "division-c", MessageType::Request)
                .priority(priority)
                .build(now())
                .unwrap();
            ids.push(message.message_id().to_string());
            mesh.services.router.send(message).await.unwrap();
        }
        gate.notify_one();

        assert_eq!(
            mesh.wait_for(&blocker_id, MessageStatus::Delivered).await,
            Some(MessageStatus::Delivered)
        );
        for id in &ids {
            assert_eq!(
                mesh.wait_for(id, MessageStatus::Delivered).await,
                Some(MessageStatus::Delivered)
            );
        }
        assert_eq!(*order.lock(), vec![9, 5, 1]);

        mesh.stop().await;
    }
}
