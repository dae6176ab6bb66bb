//! # Dispatch Flows
//!
//! Subscribers on the mesh's event bus.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use dm_02_message_router::{MessageRouterApi, DEAD_LETTER_ALERT};
    use parking_lot::Mutex;
    use serde_json::json;
    use shared_bus::{
        BusEvent, EventFilter, EventHandler, EventHandlerError, EventPublisher, FilterPattern,
        FnEventHandler, AGENT_HEARTBEAT, AGENT_MESSAGE, MESH_EVENT_SOURCE, SYSTEM_EVENT,
    };
    use shared_types::{MessageStatus, MessageType};
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<BusEvent>>>, Arc<dyn EventHandler>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let handler = FnEventHandler::new(move |event: BusEvent| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event);
                Ok::<(), EventHandlerError>(())
            }
        });
        (events, Arc::new(handler))
    }

    #[tokio::test]
    async fn test_unfiltered_heartbeat_subscription_sees_every_heartbeat() {
        let mesh = TestMesh::start(&[]);
        let (events, handler) = recorder();
        mesh.services.router.subscribe(AGENT_HEARTBEAT, handler, None);

        for (source, target) in [("division-a", "division-b"), ("division-c", "division-c")] {
            let beat = mesh.message(source, target, MessageType::Heartbeat).build(now()).unwrap();
            mesh.services.router.send(beat).await.unwrap();
        }
        let request = mesh
            .message("division-c", "division-c", MessageType::Request)
            .build(now())
            .unwrap();
        mesh.services.router.send(request).await.unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == AGENT_HEARTBEAT));
        assert!(events.iter().all(|e| e.source == MESH_EVENT_SOURCE));
        drop(events);

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_exists_filter_excludes_events_without_field() {
        let mesh = TestMesh::start(&[]);
        let (events, handler) = recorder();
        let filter = EventFilter::pattern(FilterPattern::any().exists("targetDivisionId"));
        mesh.services
            .router
            .subscribe(AGENT_MESSAGE, handler, Some(filter));

        let routed = mesh
            .message("division-b", "division-b", MessageType::Event)
            .build(now())
            .unwrap();
        let routed_id = routed.message_id().to_string();
        mesh.services.router.route(routed).await.unwrap();

        // Published by another producer on the shared bus, without a target.
        mesh.services
            .bus
            .publish(BusEvent::new(
                AGENT_MESSAGE,
                "external-gateway",
                json!({"messageId": "ext-1", "payload": {}}),
            ))
            .await;

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["messageId"], routed_id.as_str());
        assert_eq!(events[0].payload["targetDivisionId"], "division-b");
        drop(events);

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_dead_letter_raises_system_alert() {
        let mesh = TestMesh::start(&[]);
        let (_, handler) = failing_times(usize::MAX);
        handle_requests(&mesh, handler);

        let (alerts, recorder) = recorder();
        let filter = EventFilter::pattern(FilterPattern::any().equals("alert", DEAD_LETTER_ALERT));
        let subscription = mesh
            .services
            .router
            .subscribe(SYSTEM_EVENT, recorder, Some(filter));

        let message = mesh
            .message("division-c", "division-c", MessageType::Request)
            .max_retries(1)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();
        mesh.services.router.send(message).await.unwrap();

        assert_eq!(
            mesh.wait_for(&id, MessageStatus::Expired).await,
            Some(MessageStatus::Expired)
        );
        for _ in 0..100 {
            if !alerts.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        {
            let alerts = alerts.lock();
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].payload["messageId"], id.as_str());
            assert_eq!(alerts[0].payload["retryCount"], 1);
            assert!(alerts[0].payload["reason"]
                .as_str()
                .unwrap()
                .starts_with("retries_exhausted"));
        }

        assert!(mesh.services.router.unsubscribe(&subscription));
        mesh.stop().await;
    }
}
