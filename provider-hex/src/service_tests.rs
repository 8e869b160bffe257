//! ProviderService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use provider_client::{
        GatewayClient, GatewayConfig, KeySource, Payer, RequestContext, RequestSigner,
        ResellerClient, ResellerConfig, ResellerOperation, RetryPolicy, SignatureVerifier,
        Transport,
    };
    use provider_repo::IdempotencyStore;
    use provider_types::domain::CredentialMode;
    use provider_types::{
        AppError, CheckoutSession, GatewayEvent, HttpRequest, HttpResponse, PayResult,
        ProviderError, TokenProvider, TransportFailure, UpstreamHttp, UsageBatchRequest,
        WebhookHandler,
    };

    use crate::{ProviderService, SignedDelivery};

    const CLIENT_PRIVATE: &str = include_str!("../../provider-client/tests/fixtures/client_private.pem");
    const SERVER_PRIVATE: &str = include_str!("../../provider-client/tests/fixtures/server_private.pem");
    const SERVER_PUBLIC: &str = include_str!("../../provider-client/tests/fixtures/server_public.pem");
    const ROGUE_PRIVATE: &str = include_str!("../../provider-client/tests/fixtures/rogue_private.pem");

    const GATEWAY_BASE: &str = "http://gateway.test";
    const RESELLER_BASE: &str = "http://reseller.test";

    /// Fake upstream for both the gateway and the reseller API.
    ///
    /// Gateway replies are signed with the server key and change on every call,
    /// so a replayed response is distinguishable from a fresh one.
    #[derive(Default)]
    pub struct FakeUpstream {
        gateway_calls: AtomicUsize,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeUpstream {
        pub fn gateway_calls(&self) -> usize {
            self.gateway_calls.load(Ordering::SeqCst)
        }

        fn gateway_reply(&self, request: &HttpRequest) -> HttpResponse {
            let n = self.gateway_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let path = request
                .url
                .trim_start_matches(GATEWAY_BASE)
                .split('?')
                .next()
                .unwrap_or_default()
                .to_string();
            let data = if path.ends_with("/pay") || path.contains("payments/pay") {
                json!({"normal_url": format!("https://pay.test/p/{}", n), "payment_id": format!("PAYID{}", n)})
            } else {
                json!({"normal_url": format!("https://pay.test/c/{}", n), "paymentId": format!("P{}", n)})
            };
            let raw = serde_json::to_vec(&json!({"result": {"result": "S"}, "data": data})).unwrap();
            let headers = RequestSigner::new("GATEWAY", Some(KeySource::Pem(SERVER_PRIVATE.into())))
                .headers_at(request.method.as_ref(), &path, &raw, "1700000000000")
                .unwrap();
            HttpResponse::new(200, raw)
                .with_header("Authorization", headers.authorization)
                .with_header("X-Appid", headers.app_id)
        }

        fn reseller_reply(&self, request: &HttpRequest) -> HttpResponse {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let reference = body["order_reference"].as_str().unwrap_or_default();
            if reference == "BROKEN" {
                return HttpResponse::new(404, b"not found".to_vec());
            }
            let reply = json!({
                "code": 0,
                "data": {"order": {"order_reference": reference, "used_mb": 128}},
                "msg": ""
            });
            HttpResponse::new(200, serde_json::to_vec(&reply).unwrap())
        }
    }

    #[async_trait]
    impl UpstreamHttp for FakeUpstream {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
            self.requests.lock().unwrap().push(request.clone());
            if request.url.starts_with(GATEWAY_BASE) {
                Ok(self.gateway_reply(&request))
            } else {
                Ok(self.reseller_reply(&request))
            }
        }
    }

    struct FixedToken;

    #[async_trait]
    impl TokenProvider for FixedToken {
        fn mode(&self) -> CredentialMode {
            CredentialMode::Live
        }

        async fn get_token(&self) -> Result<String, ProviderError> {
            Ok("tok".into())
        }

        async fn refresh(&self) -> Result<String, ProviderError> {
            Ok("tok".into())
        }
    }

    /// Records every dispatched event and reports one update per event.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub events: Mutex<Vec<(GatewayEvent, Option<String>)>>,
    }

    #[async_trait]
    impl WebhookHandler for RecordingHandler {
        async fn handle(
            &self,
            event: GatewayEvent,
            request_id: Option<&str>,
        ) -> Result<u32, AppError> {
            let updated = match event {
                GatewayEvent::Ignored { .. } => 0,
                _ => 1,
            };
            self.events
                .lock()
                .unwrap()
                .push((event, request_id.map(str::to_string)));
            Ok(updated)
        }
    }

    fn service(upstream: Arc<FakeUpstream>) -> ProviderService<RecordingHandler> {
        let reseller_config = ResellerConfig {
            mode: CredentialMode::Live,
            base_url: Some(RESELLER_BASE.into()),
            ..Default::default()
        };
        let transport = Transport::new(
            &reseller_config,
            RetryPolicy::none(),
            upstream.clone(),
            Arc::new(FixedToken),
        );
        let reseller = ResellerClient::new(Arc::new(transport), reseller_config);

        let gateway = GatewayClient::new(
            GatewayConfig {
                base_url: Some(GATEWAY_BASE.into()),
                app_id: "APPID".into(),
                ..Default::default()
            },
            upstream,
            RetryPolicy::none(),
        )
        .with_keys(
            RequestSigner::new("APPID", Some(KeySource::Pem(CLIENT_PRIVATE.into()))),
            SignatureVerifier::new(Some(KeySource::Pem(SERVER_PUBLIC.into()))),
        );

        ProviderService::new(
            reseller,
            gateway,
            IdempotencyStore::new(),
            RecordingHandler::default(),
        )
    }

    fn create_body() -> Value {
        json!({"orderId": "O1", "amount": 9.99})
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Idempotent payments
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_payment_twice_with_same_key_calls_upstream_once() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(upstream.clone());
        let ctx = RequestContext::new();

        let first = service
            .create_payment(&create_body(), Some("K1"), &Payer::default(), &ctx)
            .await
            .unwrap();
        let second = service
            .create_payment(&create_body(), Some("K1"), &Payer::default(), &ctx)
            .await
            .unwrap();

        assert_eq!(upstream.gateway_calls(), 1);
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.body, second.body);

        let session: CheckoutSession = second.parse().unwrap();
        assert_eq!(session.checkout_url, "https://pay.test/c/1");
        assert_eq!(session.payment_id, "P1");
    }

    #[tokio::test]
    async fn test_create_payment_without_key_always_calls_upstream() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(upstream.clone());
        let ctx = RequestContext::new();

        let first = service
            .create_payment(&create_body(), None, &Payer::default(), &ctx)
            .await
            .unwrap();
        let second = service
            .create_payment(&create_body(), Some("  "), &Payer::default(), &ctx)
            .await
            .unwrap();

        assert_eq!(upstream.gateway_calls(), 2);
        assert_ne!(first.body, second.body);
    }

    #[tokio::test]
    async fn test_same_key_with_different_body_is_a_new_operation() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(upstream.clone());
        let ctx = RequestContext::new();

        service
            .create_payment(&create_body(), Some("K1"), &Payer::default(), &ctx)
            .await
            .unwrap();
        let other = service
            .create_payment(
                &json!({"orderId": "O1", "amount": 19.99}),
                Some("K1"),
                &Payer::default(),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(upstream.gateway_calls(), 2);
        assert!(!other.replayed);
    }

    #[tokio::test]
    async fn test_create_payment_validates_before_calling_upstream() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(upstream.clone());
        let ctx = RequestContext::new();

        let missing = service
            .create_payment(&json!({"orderId": " "}), Some("K1"), &Payer::default(), &ctx)
            .await;
        let negative = service
            .create_payment(
                &json!({"orderId": "O1", "amount": -1}),
                None,
                &Payer::default(),
                &ctx,
            )
            .await;
        let malformed = service
            .create_payment(&json!({"amount": 1}), None, &Payer::default(), &ctx)
            .await;

        assert!(matches!(missing, Err(AppError::BadRequest(_))));
        assert!(matches!(negative, Err(AppError::BadRequest(_))));
        assert!(matches!(malformed, Err(AppError::BadRequest(_))));
        assert_eq!(upstream.gateway_calls(), 0);
    }

    #[tokio::test]
    async fn test_pay_is_idempotent() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(upstream.clone());
        let ctx = RequestContext::new();
        let body = json!({"orderId": "O1", "method": "alipay", "amount": 5});

        let first = service
            .pay(&body, Some("PAY-1"), &Payer::default(), &ctx)
            .await
            .unwrap();
        let second = service
            .pay(&body, Some("PAY-1"), &Payer::default(), &ctx)
            .await
            .unwrap();

        assert_eq!(upstream.gateway_calls(), 1);
        assert_eq!(first.body, second.body);
        let result: PayResult = first.parse().unwrap();
        assert_eq!(result.payment_id, "PAYID1");
    }

    #[tokio::test]
    async fn test_failed_card_pay_is_not_stored() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(upstream.clone());
        let ctx = RequestContext::new();
        let body = json!({"orderId": "O1", "method": "card"});

        let err = service
            .pay(&body, Some("PAY-2"), &Payer::default(), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(upstream.gateway_calls(), 0);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reseller
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_usage_batch_keeps_order_and_isolates_failures() {
        let upstream = Arc::new(FakeUpstream::default());
        let service = service(upstream).with_usage_concurrency(2);

        let response = service
            .usage_batch(
                UsageBatchRequest {
                    order_references: vec!["R2".into(), "BROKEN".into(), "R1".into(), "R2".into()],
                },
                &RequestContext::new(),
            )
            .await
            .unwrap();

        let refs: Vec<&str> = response
            .items
            .iter()
            .map(|i| i.order_reference.as_str())
            .collect();
        assert_eq!(refs, vec!["R2", "BROKEN", "R1"]);
        assert_eq!(response.items[0].usage["used_mb"], 128);
        assert_eq!(response.items[1].usage, json!({}));
    }

    #[tokio::test]
    async fn test_usage_batch_requires_references() {
        let service = service(Arc::new(FakeUpstream::default()));
        let err = service
            .usage_batch(
                UsageBatchRequest {
                    order_references: vec![" ".into()],
                },
                &RequestContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_send_reseller_maps_upstream_not_found() {
        let service = service(Arc::new(FakeUpstream::default()));
        let err = service
            .send_reseller(
                ResellerOperation::OrderDetail,
                &json!({"order_reference": "BROKEN"}),
                &RequestContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Webhooks
    // ─────────────────────────────────────────────────────────────────────────────

    fn signed(private_pem: &str, path: &str, body: &[u8]) -> (String, String) {
        let headers = RequestSigner::new("GATEWAY", Some(KeySource::Pem(private_pem.into())))
            .headers_at("POST", path, body, "1700000000000")
            .unwrap();
        (headers.authorization, headers.app_id)
    }

    #[tokio::test]
    async fn test_gateway_webhook_is_verified_then_dispatched() {
        let service = service(Arc::new(FakeUpstream::default()));
        let body = serde_json::to_vec(&json!({
            "business_type": "ACQUIRING_PAYMENT",
            "data": {"payment_status": "SUCCESS", "payment_method": "PAYPAL", "payment_id": "G1"}
        }))
        .unwrap();
        let (authorization, app_id) = signed(SERVER_PRIVATE, "/webhooks/gateway", &body);

        let ack = service
            .handle_gateway_webhook(
                SignedDelivery {
                    method: "POST",
                    path: "/webhooks/gateway",
                    authorization: Some(&authorization),
                    app_id: Some(&app_id),
                    body: &body,
                },
                Some("rid-1"),
            )
            .await
            .unwrap();

        assert_eq!(ack.data.updated, 1);
        let events = service.webhooks().events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.kind(), "payment");
        assert_eq!(events[0].1.as_deref(), Some("rid-1"));
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_rejected_before_dispatch() {
        let service = service(Arc::new(FakeUpstream::default()));
        let body = br#"{"provider":"card","status":"paid"}"#;
        let (authorization, app_id) = signed(ROGUE_PRIVATE, "/webhooks/payments", body);

        let rogue = service
            .handle_payment_webhook(
                SignedDelivery {
                    method: "POST",
                    path: "/webhooks/payments",
                    authorization: Some(&authorization),
                    app_id: Some(&app_id),
                    body,
                },
                None,
            )
            .await;
        let unsigned = service
            .handle_payment_webhook(
                SignedDelivery {
                    method: "POST",
                    path: "/webhooks/payments",
                    authorization: None,
                    app_id: None,
                    body,
                },
                None,
            )
            .await;

        assert!(matches!(rogue, Err(AppError::Unauthorized(_))));
        assert!(matches!(unsigned, Err(AppError::Unauthorized(_))));
        assert!(service.webhooks().events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_signed_for_another_path_is_rejected() {
        let service = service(Arc::new(FakeUpstream::default()));
        let body = br#"{"provider":"card","status":"paid"}"#;
        let (authorization, app_id) = signed(SERVER_PRIVATE, "/webhooks/gateway", body);

        let result = service
            .handle_payment_webhook(
                SignedDelivery {
                    method: "POST",
                    path: "/webhooks/payments",
                    authorization: Some(&authorization),
                    app_id: Some(&app_id),
                    body,
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_verified_but_malformed_webhook_is_bad_request() {
        let service = service(Arc::new(FakeUpstream::default()));
        let body = br#"{"status":"paid"}"#;
        let (authorization, app_id) = signed(SERVER_PRIVATE, "/webhooks/payments", body);

        let result = service
            .handle_payment_webhook(
                SignedDelivery {
                    method: "POST",
                    path: "/webhooks/payments",
                    authorization: Some(&authorization),
                    app_id: Some(&app_id),
                    body,
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_provider_mode() {
        let service = service(Arc::new(FakeUpstream::default()));
        assert_eq!(service.provider_mode(), "live");
    }
}
