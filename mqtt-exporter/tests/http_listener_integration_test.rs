mod http_listener_test {
    use http_body_util::{BodyExt, Collected, Empty};
    use hyper::{
        body::{Buf, Bytes},
        header::CONTENT_TYPE,
        Request, StatusCode, Uri,
    };
    use hyper_util::client::legacy::{connect::HttpConnector, Client};
    use mqtt_exporter::{Configuration, ExporterBuilder};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    const CONFIGURATION: &str = r#"{
        "filters": {
            "temp": {
                "filter": "sensors/(?P<L_room>[a-z]+)/temperature",
                "values": { "value": "$.value" },
                "group": "sensor"
            }
        },
        "prefix": "",
        "payloadType": "json",
        "topics": ["sensors/#"]
    }"#;

    #[test]
    fn test_http_listener() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|e| panic!("Failed to create test runtime: {:?}", e));

        runtime.block_on(async {
            let local = [127, 0, 0, 1];
            let port = get_available_port(local).await;
            let socket_address = SocketAddr::from((local, port));

            let configuration = Configuration::from_json(CONFIGURATION).unwrap();
            let (exporter, listener) = ExporterBuilder::new(configuration)
                .with_http_listener(socket_address)
                .build()
                .unwrap_or_else(|e| panic!("failed to create exporter and http listener: {:?}", e));

            let handler = exporter.handler();
            assert_eq!(handler.handle("sensors/kitchen/temperature", br#"{"value": -1.25}"#), 1);

            runtime.spawn(listener);
            tokio::time::sleep(Duration::from_millis(200)).await;

            let uri = format!("http://{socket_address}/metrics")
                .parse::<Uri>()
                .unwrap_or_else(|e| panic!("Error parsing URI: {:?}", e));

            let (status, body, content_type) = read_from(uri).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(content_type, "text/plain; version=0.0.4");

            let body = String::from_utf8(body).unwrap();
            assert!(body.contains("# TYPE last_push_timestamp_seconds gauge"));
            assert!(body.contains("# HELP sensor_value MQTT value 'sensor_value'"));
            assert!(body.contains("sensor_value{room=\"kitchen\"} -1.25"));

            exporter.shutdown();
        });
    }

    #[test]
    fn test_http_listener_custom_path() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|e| panic!("Failed to create test runtime: {:?}", e));

        runtime.block_on(async {
            let local = [127, 0, 0, 1];
            let port = get_available_port(local).await;
            let socket_address = SocketAddr::from((local, port));

            let configuration = Configuration::from_json(CONFIGURATION).unwrap();
            let (_exporter, listener) = ExporterBuilder::new(configuration)
                .with_http_listener(socket_address)
                .with_metrics_path("/scrape")
                .build()
                .unwrap_or_else(|e| panic!("failed to create exporter and http listener: {:?}", e));

            runtime.spawn(listener);
            tokio::time::sleep(Duration::from_millis(200)).await;

            for (path, expected) in [
                ("/scrape", StatusCode::OK),
                ("/metrics", StatusCode::NOT_FOUND),
                ("/", StatusCode::NOT_FOUND),
            ] {
                let uri = format!("http://{socket_address}{path}")
                    .parse::<Uri>()
                    .unwrap_or_else(|e| panic!("Error parsing URI: {:?}", e));

                let (status, body, _) = read_from(uri).await;
                assert_eq!(status, expected, "path {path}");
                if expected == StatusCode::NOT_FOUND {
                    assert!(body.is_empty());
                }
            }
        });
    }

    #[test]
    fn test_http_listener_bind_failure() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let socket_address = occupied.local_addr().unwrap();

        let configuration = Configuration::from_json(CONFIGURATION).unwrap();
        let result = ExporterBuilder::new(configuration).with_http_listener(socket_address).build();

        assert!(matches!(
            result,
            Err(mqtt_exporter::BuildError::FailedToCreateHTTPListener(_))
        ));
    }

    async fn get_available_port(listen_address: [u8; 4]) -> u16 {
        let socket_address = SocketAddr::from((listen_address, 0));
        TcpListener::bind(socket_address)
            .await
            .unwrap_or_else(|e| {
                panic!("Unable to bind to an available port on address {socket_address}: {:?}", e);
            })
            .local_addr()
            .expect("Unable to obtain local address from TcpListener")
            .port()
    }

    async fn read_from(endpoint: Uri) -> (StatusCode, Vec<u8>, String) {
        let client =
            Client::builder(hyper_util::rt::TokioExecutor::new()).build(HttpConnector::new());

        let req = Request::builder()
            .uri(endpoint.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap_or_else(|e| panic!("Failed building request: {:?}", e));

        let response = client
            .request(req)
            .await
            .unwrap_or_else(|e| panic!("Failed requesting data from {endpoint}: {:?}", e));

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body = response
            .into_body()
            .collect()
            .await
            .map(Collected::aggregate)
            .unwrap_or_else(|e| panic!("Error reading response: {:?}", e));

        let body_bytes = body.copy_to_bytes(body.remaining()).to_vec();

        (status, body_bytes, content_type)
    }
}
