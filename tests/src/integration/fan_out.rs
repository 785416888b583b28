//! # Fan-Out / Fan-In Flows
//!
//! The calculator client aggregates replies from calculator servers.
//!
//! ## Flows Tested
//!
//! 1. A successful request resolves to the first reply
//! 2. Error replies (division by zero, unknown operation) abort aggregation
//! 3. A request nobody answers times out within its TTL

#[cfg(test)]
mod tests {
    use crate::calculator::*;
    use applet_bus::{
        aggregate_responses, BusConfig, ChannelError, FanInError, FanInPolicy, FanOutRequest,
        FirstInWins, InMemoryMessageBroker,
    };
    use applet_types::AppContract;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;
    use tokio_stream::StreamExt;
    use tokio_util::sync::CancellationToken;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn broker() -> InMemoryMessageBroker {
        applet_telemetry::init_test_logging();
        let contract: Arc<dyn AppContract> = Arc::new(calculator_contract().unwrap());
        InMemoryMessageBroker::new(
            contract,
            Arc::new(calculator_serializer().unwrap()),
            BusConfig::default().without_heartbeat(),
        )
        .unwrap()
    }

    fn policy(ttl: Duration) -> Option<Box<dyn FanInPolicy<CalcResponse>>> {
        Some(Box::new(FirstInWins::<CalcResponse>::new(ttl)))
    }

    // =============================================================================
    // FAN-OUT TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_add_resolves_to_first_reply() {
        let broker = broker();
        let cancel = CancellationToken::new();
        let server = spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone());
        let client = broker.create_channel(&client_id()).unwrap();

        let response = CalcRequest::new(1.0, 2.0, CalcOperation::Add)
            .aggregate(&client, &cancel)
            .await
            .unwrap();
        assert_eq!(response, CalcResponse { result: 3.0 });
        assert_eq!(client.pending_requests(), 0);

        cancel.cancel();
        let _ = server.await.unwrap();
    }

    #[tokio::test]
    async fn test_divide_by_zero_is_bad_request() {
        let broker = broker();
        let cancel = CancellationToken::new();
        let server = spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone());
        let client = broker.create_channel(&client_id()).unwrap();

        let err = CalcRequest::new(1.0, 0.0, CalcOperation::Divide)
            .aggregate(&client, &cancel)
            .await
            .unwrap_err();

        let reply = err.error_reply().expect("error reply");
        assert!(reply.is_error());
        assert_eq!(reply.sender(), Some(&server_id()));
        assert_eq!(reply.text().await.unwrap(), "Division by zero");
        assert!(err.to_string().contains("Division by zero"));
        assert_eq!(client.pending_requests(), 0);

        cancel.cancel();
        let _ = server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_operation_is_bad_request() {
        let broker = broker();
        let cancel = CancellationToken::new();
        let server = spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone());
        let client = broker.create_channel(&client_id()).unwrap();

        let request = CalcRequest {
            lhs: 1.0,
            rhs: 2.0,
            op: 42,
        };
        let err = request.aggregate(&client, &cancel).await.unwrap_err();
        match err {
            FanInError::BadFanOutRequest(reply) => {
                assert_eq!(reply.body_as_text(), Some("Unknown operation code: 42"));
            }
            other => panic!("expected a bad request, got {other}"),
        }

        cancel.cancel();
        let _ = server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let broker = broker();
        let client = broker.create_channel(&client_id()).unwrap();
        let ttl = Duration::from_millis(50);

        let started = Instant::now();
        let result = timeout(
            Duration::from_secs(2),
            aggregate_responses(
                &CalcRequest::new(1.0, 2.0, CalcOperation::Add),
                &client,
                policy(ttl),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("aggregation must not hang");

        assert!(matches!(result, Err(FanInError::Timeout { ttl: t }) if t == ttl));
        assert!(started.elapsed() >= ttl);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_first_of_many_responders_wins() {
        let broker = broker();
        let cancel = CancellationToken::new();
        let servers: Vec<_> = (0..3)
            .map(|_| spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone()))
            .collect();
        let client = broker.create_channel(&client_id()).unwrap();

        let response = CalcRequest::new(6.0, 7.0, CalcOperation::Multiply)
            .aggregate(&client, &cancel)
            .await
            .unwrap();
        assert_eq!(response.result, 42.0);

        cancel.cancel();
        for server in servers {
            let _ = server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_reply_stream_yields_every_reply() {
        let broker = broker();
        let cancel = CancellationToken::new();
        let servers: Vec<_> = (0..2)
            .map(|_| spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone()))
            .collect();
        let client = broker.create_channel(&client_id()).unwrap();

        let mut replies = client
            .get_responses(
                calc_request_intent(),
                &CalcRequest::new(5.0, 3.0, CalcOperation::Subtract),
                Duration::from_millis(300),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(client.pending_requests(), 1);

        let mut results = Vec::new();
        while let Some(reply) = replies.next().await {
            let reply = reply.unwrap();
            assert_eq!(reply.correlation_id(), Some(replies.correlation_id()));
            results.push(reply.payload::<CalcResponse>().await.unwrap().result);
        }
        assert_eq!(results, vec![2.0, 2.0]);
        assert_eq!(client.pending_requests(), 0);

        cancel.cancel();
        for server in servers {
            let _ = server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_aggregation() {
        let broker = broker();
        let client = broker.create_channel(&client_id()).unwrap();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };
        let err = aggregate_responses(
            &CalcRequest::new(1.0, 2.0, CalcOperation::Add),
            &client,
            policy(Duration::from_secs(30)),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FanInError::Channel(ChannelError::Cancelled)));
        assert_eq!(client.pending_requests(), 0);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_may_not_request() {
        let broker = broker();
        let server = broker.create_channel(&server_id()).unwrap();

        let err = CalcRequest::new(1.0, 2.0, CalcOperation::Add)
            .aggregate(&server, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FanInError::Channel(ChannelError::ContractViolation(_))
        ));
        assert_eq!(broker.transport().published(), 0);
    }
}
