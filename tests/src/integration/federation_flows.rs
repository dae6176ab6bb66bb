//! # Federation Flows
//!
//! Routing decisions made by the federation gate, observed through a
//! running mesh.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use dm_01_federation::FederationApi;
    use dm_02_message_router::{MessageRouterApi, RouteOutcome};
    use shared_types::{DivisionPermissions, MessageStatus, MessageType};

    #[tokio::test]
    async fn test_untrusted_division_fails_in_one_routing_call() {
        let mesh = TestMesh::start(&[]);
        let (calls, handler) = failing_times(0);
        handle_requests(&mesh, handler);

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .ttl_secs(5)
            .max_retries(3)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();

        let receipt = mesh.services.router.send(message).await.unwrap();
        assert_eq!(receipt.status(), MessageStatus::Failed);
        assert_eq!(
            receipt.error_message(),
            Some("authorization_denied: untrusted_division")
        );

        let attrs = mesh.services.router.queue_attributes("division-b").await.unwrap();
        assert_eq!(attrs.visible + attrs.delayed + attrs.in_flight, 0);

        // Never retried, however often the producer asks.
        let retried = mesh
            .services
            .router
            .retry_failed(std::time::Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(retried, 0);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(mesh.services.router.receipts(&id).len(), 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_same_division_bypasses_trust() {
        let mesh = TestMesh::start(&[]);
        let (_, handler) = failing_times(0);
        handle_requests(&mesh, handler);

        let message = mesh
            .message("division-c", "division-c", MessageType::Request)
            .build(now())
            .unwrap();
        let id = message.message_id().to_string();
        let outcome = mesh.services.router.route(message).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Enqueued);

        assert_eq!(
            mesh.wait_for(&id, MessageStatus::Delivered).await,
            Some(MessageStatus::Delivered)
        );
        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_trust_is_directional_and_per_action() {
        let mesh = TestMesh::start(&["division-a>division-b:request"]);

        let reverse = mesh
            .message("division-b", "division-a", MessageType::Request)
            .build(now())
            .unwrap();
        let outcome = mesh.services.router.route(reverse).await.unwrap();
        assert_eq!(
            outcome.rejection(),
            Some("authorization_denied: untrusted_division")
        );

        let event = mesh
            .message("division-a", "division-b", MessageType::Event)
            .build(now())
            .unwrap();
        let outcome = mesh.services.router.route(event).await.unwrap();
        assert_eq!(
            outcome.rejection(),
            Some("authorization_denied: action_not_permitted")
        );

        let request = mesh
            .message("division-a", "division-b", MessageType::Request)
            .build(now())
            .unwrap();
        assert_eq!(
            mesh.services.router.route(request).await.unwrap(),
            RouteOutcome::Enqueued
        );
        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_revoked_trust_denies_new_messages() {
        let mesh = TestMesh::start(&["division-a>division-b:request"]);
        assert!(mesh
            .services
            .federation
            .unregister_trusted_division("division-a", "division-b"));

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .build(now())
            .unwrap();
        let outcome = mesh.services.router.route(message).await.unwrap();
        assert_eq!(
            outcome.rejection(),
            Some("authorization_denied: untrusted_division")
        );
        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_restricted_agent_denied() {
        let mesh = TestMesh::start(&["division-a>division-b:request"]);
        mesh.services
            .permissions
            .put(DivisionPermissions::new("division-b").with_restricted_agent("agent-x"));

        let message = mesh
            .message("division-a", "division-b", MessageType::Request)
            .build(now())
            .unwrap();
        let outcome = mesh.services.router.route(message).await.unwrap();
        assert_eq!(
            outcome.rejection(),
            Some("authorization_denied: agent_restricted")
        );
        mesh.stop().await;
    }

    #[tokio::test]
    async fn test_request_budget_enforced_per_pair() {
        let mut config = fast_config(&["division-a>division-b:request"]);
        config.max_requests_per_minute = Some(2);
        let mesh = TestMesh::start_with(config);

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            let message = mesh
                .message("division-a", "division-b", MessageType::Request)
                .build(now())
                .unwrap();
            outcomes.push(mesh.services.router.route(message).await.unwrap());
        }
        assert_eq!(outcomes[0], RouteOutcome::Enqueued);
        assert_eq!(outcomes[1], RouteOutcome::Enqueued);
        assert_eq!(
            outcomes[2].rejection(),
            Some("authorization_denied: rate_limited")
        );
        mesh.stop().await;
    }
}
