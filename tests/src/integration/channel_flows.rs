//! # Channel Flows
//!
//! Lifecycle and permission behavior seen across several channels.
//!
//! ## Flows Tested
//!
//! 1. A channel never receives its own envelopes; a sibling instance does
//! 2. Contract permissions are directional
//! 3. A request and its reply may share intent and payload type
//! 4. Disposal ends open reply streams without an error
//! 5. A transport shutdown surfaces as an error on streams and listeners

#[cfg(test)]
mod tests {
    use crate::calculator::*;
    use applet_bus::{
        BusConfig, ChannelError, DeliveryArgs, EmitOptions, HandlerTable, InMemoryMessageBroker,
        Payload, TransportError,
    };
    use applet_types::{AppContract, AppContractBuilder, MessageIntentId, NullContract};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;
    use tokio_util::sync::CancellationToken;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn broker(contract: Arc<dyn AppContract>) -> InMemoryMessageBroker {
        applet_telemetry::init_test_logging();
        InMemoryMessageBroker::new(
            contract,
            Arc::new(calculator_serializer().unwrap()),
            BusConfig::default().without_heartbeat(),
        )
        .unwrap()
    }

    fn calculator_broker() -> InMemoryMessageBroker {
        broker(Arc::new(calculator_contract().unwrap()))
    }

    /// Forward every delivered event into a channel the test can read.
    fn collector(
        cancel: &CancellationToken,
        channel: applet_bus::AppletChannel,
    ) -> (
        mpsc::UnboundedReceiver<DeliveryArgs>,
        tokio::task::JoinHandle<Result<(), ChannelError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            channel
                .listen_all(
                    move |args| {
                        let tx = tx.clone();
                        async move {
                            let _ = tx.send(args);
                            Ok(())
                        }
                    },
                    &cancel,
                )
                .await
        });
        (rx, handle)
    }

    // =============================================================================
    // DELIVERY TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_sibling_instance_receives_but_sender_does_not() {
        let broker = broker(Arc::new(NullContract));
        let cancel = CancellationToken::new();
        let first = broker.create_channel(&server_id()).unwrap();
        let second = broker.create_channel(&server_id()).unwrap();
        assert_ne!(first.instance_id(), second.instance_id());

        let (mut first_rx, first_task) = collector(&cancel, first.clone());
        let (mut second_rx, second_task) = collector(&cancel, second.clone());

        first
            .emit_event(
                calc_reply_intent(),
                &CalcResponse { result: 7.0 },
                EmitOptions::default(),
                &cancel,
            )
            .await
            .unwrap();

        let delivered = timeout(Duration::from_secs(1), second_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.sender(), Some(&server_id()));
        assert_eq!(delivered.receiver(), &server_id());
        assert_eq!(delivered.payload::<CalcResponse>().await.unwrap().result, 7.0);

        assert!(timeout(Duration::from_millis(100), first_rx.recv())
            .await
            .is_err());
        assert_eq!(first.stats().received.load(std::sync::atomic::Ordering::Relaxed), 0);

        cancel.cancel();
        assert!(matches!(first_task.await.unwrap(), Err(ChannelError::Cancelled)));
        assert!(matches!(second_task.await.unwrap(), Err(ChannelError::Cancelled)));
    }

    #[tokio::test]
    async fn test_reply_reaches_only_the_requester() {
        let broker = calculator_broker();
        let cancel = CancellationToken::new();
        let server = spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone());
        let requester = broker.create_channel(&client_id()).unwrap();
        let bystander = broker.create_channel(&client_id()).unwrap();

        let response = timeout(
            Duration::from_secs(2),
            applet_bus::FanOutRequest::aggregate(
                &CalcRequest::new(2.0, 2.0, CalcOperation::Add),
                &requester,
                &cancel,
            ),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(response.result, 4.0);

        // The bystander is the destination applet too, but has no open
        // conversation; the reply is not a subscription of the client.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            bystander
                .stats()
                .events_queued
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );
        assert_eq!(
            requester
                .stats()
                .replies_routed
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );

        cancel.cancel();
        let _ = server.await.unwrap();
    }

    // =============================================================================
    // PERMISSION TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_permissions_are_directional() {
        let broker = calculator_broker();
        let cancel = CancellationToken::new();
        let client = broker.create_channel(&client_id()).unwrap();
        let server = broker.create_channel(&server_id()).unwrap();

        let err = server
            .get_responses(
                calc_request_intent(),
                &CalcRequest::new(1.0, 1.0, CalcOperation::Add),
                Duration::from_millis(50),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ContractViolation(_)));
        assert!(err.to_string().contains("CalcServer"));

        let err = client
            .emit_event(
                calc_reply_intent(),
                &CalcResponse { result: 1.0 },
                EmitOptions::default(),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ContractViolation(_)));

        server
            .emit_event(
                calc_reply_intent(),
                &CalcResponse { result: 1.0 },
                EmitOptions::default(),
                &cancel,
            )
            .await
            .unwrap();

        // The client is not a listener at all.
        let err = client.listen_all(|_| async { Ok(()) }, &cancel).await.unwrap_err();
        assert!(matches!(err, ChannelError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn test_shared_shape_request_gets_only_the_reply() {
        let echo = MessageIntentId::new("echo").unwrap();
        let shape = CalcResponse::PAYLOAD_TYPE;
        let mut builder = AppContractBuilder::new();
        builder
            .add_message_intent(echo.clone(), Some("Echo"))
            .unwrap()
            .add_applet(client_id(), Some("CalcClient"))
            .unwrap()
            .add_applet(server_id(), Some("CalcServer"))
            .unwrap()
            .enable_response_stream(&client_id(), &echo, shape, &echo, shape)
            .unwrap()
            .enable_subscription(&server_id(), &echo, shape)
            .unwrap()
            .enable_broadcast(&server_id(), &echo, shape)
            .unwrap();
        let broker = broker(Arc::new(builder.build().unwrap()));
        let cancel = CancellationToken::new();

        let server = broker.create_channel(&server_id()).unwrap();
        let table = {
            let (echo, cancel) = (echo.clone(), cancel.clone());
            HandlerTable::builder()
                .route_payload::<CalcResponse, _, _>(echo.clone(), move |args, value| {
                    let (echo, cancel) = (echo.clone(), cancel.clone());
                    async move {
                        let doubled = CalcResponse {
                            result: value.result * 2.0,
                        };
                        args.reply_with(echo, &doubled, &cancel).await?;
                        Ok(())
                    }
                })
                .build()
        };
        let server_task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { server.listen(table, &cancel).await })
        };

        let client = broker.create_channel(&client_id()).unwrap();
        let replies: Vec<_> = client
            .get_responses(
                echo,
                &CalcResponse { result: 21.0 },
                Duration::from_millis(200),
                &cancel,
            )
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(replies.len(), 1);
        let reply = replies.into_iter().next().unwrap().unwrap();
        assert_eq!(reply.sender(), Some(&server_id()));
        assert_eq!(reply.payload::<CalcResponse>().await.unwrap().result, 42.0);

        cancel.cancel();
        assert!(matches!(server_task.await.unwrap(), Err(ChannelError::Cancelled)));
    }

    // =============================================================================
    // LIFECYCLE TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_dispose_completes_open_stream() {
        let broker = calculator_broker();
        let cancel = CancellationToken::new();
        let client = broker.create_channel(&client_id()).unwrap();

        let mut replies = client
            .get_responses(
                calc_request_intent(),
                &CalcRequest::new(1.0, 1.0, CalcOperation::Add),
                Duration::from_secs(30),
                &cancel,
            )
            .await
            .unwrap();

        // Publish, then wait for replies that never come.
        assert!(timeout(Duration::from_millis(50), replies.next())
            .await
            .is_err());
        assert_eq!(broker.transport().published(), 1);

        client.dispose();
        let next = timeout(Duration::from_secs(1), replies.next()).await.unwrap();
        assert!(next.is_none());
        assert!(replies.is_finished());
        assert_eq!(client.pending_requests(), 0);

        let err = client
            .get_responses(
                calc_request_intent(),
                &CalcRequest::new(1.0, 1.0, CalcOperation::Add),
                Duration::from_secs(1),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Disposed { .. }));
    }

    #[tokio::test]
    async fn test_transport_shutdown_fails_streams_and_listeners() {
        let broker = calculator_broker();
        let cancel = CancellationToken::new();
        let server = spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone());
        let client = broker.create_channel(&client_id()).unwrap();

        let mut replies = client
            .get_responses(
                calc_request_intent(),
                &CalcRequest::new(1.0, 0.5, CalcOperation::Multiply),
                Duration::from_secs(30),
                &cancel,
            )
            .await
            .unwrap();
        let first = timeout(Duration::from_secs(1), replies.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.payload::<CalcResponse>().await.unwrap().result, 0.5);

        broker.transport().shutdown();

        let next = timeout(Duration::from_secs(1), replies.next()).await.unwrap();
        assert!(matches!(
            next,
            Some(Err(ChannelError::Transport(TransportError::Closed)))
        ));
        assert!(timeout(Duration::from_secs(1), replies.next())
            .await
            .unwrap()
            .is_none());

        let listener = timeout(Duration::from_secs(1), server).await.unwrap().unwrap();
        assert!(matches!(
            listener,
            Err(ChannelError::Transport(TransportError::Closed))
        ));

        let err = client.send_info("anyone there?", &cancel).await.unwrap_err();
        assert!(matches!(err, ChannelError::Transport(TransportError::Closed)));
    }
}
