//! End-to-end client/server exchanges over every option combination.

mod common;

use std::time::Duration;

use common::{start_server, test_options, EchoArgs, EchoResult, Empty, NotifyArgs, Payload};
use thrift_stack::config::ConfigError;
use thrift_stack::error::Error;
use thrift_stack::pki::LEAF_HOSTNAME;
use thrift_stack::protocol::{ApplicationErrorKind, ProtocolKind, ProtocolRegistry};
use thrift_stack::rpc::Client;
use thrift_stack::transport::TransportError;
use thrift_stack::{connect, Carrier, ClientBuilder, Options, Server};
use x509_parser::prelude::*;

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

async fn ping(client: &mut Client) -> Result<Empty, Error> {
    tokio::time::timeout(CALL_TIMEOUT, client.call("ping", &Empty))
        .await
        .expect("ping timed out")
}

async fn echo(client: &mut Client, payload: Payload) -> Result<Payload, Error> {
    let result: EchoResult = tokio::time::timeout(
        CALL_TIMEOUT,
        client.call("echo", &EchoArgs { payload }),
    )
    .await
    .expect("echo timed out")?;
    Ok(result.success.expect("echo returns its argument"))
}

/// Ping, then echo where the protocol can decode structs.
async fn exchange(options: &Options) {
    let server = start_server(options).await;
    let (mut client, closer) = connect(&server.address(), options)
        .await
        .unwrap_or_else(|e| panic!("connect with {options:?}: {e}"));

    ping(&mut client)
        .await
        .unwrap_or_else(|e| panic!("ping with {options:?}: {e}"));
    if options.protocol != ProtocolKind::SimpleJson {
        let echoed = echo(&mut client, Payload::sample())
            .await
            .unwrap_or_else(|e| panic!("echo with {options:?}: {e}"));
        assert_eq!(echoed, Payload::sample(), "options: {options:?}");
    }
    assert_eq!(client.peer_certificate().is_some(), options.secure);

    closer.close().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn binary_buffered_plain_socket() {
    let options = test_options()
        .with_protocol(ProtocolKind::Binary)
        .with_buffered(true)
        .with_framed(false)
        .with_secure(false);
    exchange(&options).await;
}

#[tokio::test]
async fn compact_framed_tls_socket_presents_fresh_leaf() {
    let options = test_options()
        .with_protocol(ProtocolKind::Compact)
        .with_framed(true)
        .with_secure(true);
    let server = start_server(&options).await;
    let (mut client, closer) = connect(&server.address(), &options).await.unwrap();

    let echoed = echo(&mut client, Payload::sample()).await.unwrap();
    assert_eq!(echoed, Payload::sample());

    let presented = client.peer_certificate().expect("tls peer certificate");
    let (_, leaf) = X509Certificate::from_der(presented).unwrap();
    let san = leaf.subject_alternative_name().unwrap().unwrap().value;
    assert!(san
        .general_names
        .iter()
        .any(|n| matches!(n, GeneralName::DNSName(d) if *d == LEAF_HOSTNAME)));
    assert!(!leaf.is_ca());
    let organization = leaf
        .subject()
        .iter_organization()
        .next()
        .and_then(|o| o.as_str().ok());
    assert_eq!(organization, Some(options.certificate.organization.as_str()));
    let eku = leaf.extended_key_usage().unwrap().unwrap().value;
    assert!(eku.server_auth);

    let root = server.trust.as_ref().expect("secure server has a root");
    let (_, ca) = X509Certificate::from_der(root.ca_der()).unwrap();
    assert_eq!(leaf.issuer().to_string(), ca.subject().to_string());
    assert_ne!(leaf.raw_serial(), ca.raw_serial());

    closer.close().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn large_unframed_json_payload_echoes_promptly() {
    let options = test_options()
        .with_protocol(ProtocolKind::Json)
        .with_buffered(true)
        .with_framed(false);
    let server = start_server(&options).await;
    let (mut client, closer) = connect(&server.address(), &options).await.unwrap();

    let payload = Payload {
        blob: vec![7u8; 4 * 1024 * 1024],
        ..Payload::sample()
    };
    let result: EchoResult = tokio::time::timeout(
        Duration::from_secs(30),
        client.call(
            "echo",
            &EchoArgs {
                payload: payload.clone(),
            },
        ),
    )
    .await
    .expect("multi-megabyte echo should not rescan the stream per read")
    .unwrap();
    assert_eq!(result.success, Some(payload));

    // The connection is still in step afterwards.
    ping(&mut client).await.unwrap();
    closer.close().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn framing_mismatch_fails_the_call() {
    let server_options = test_options().with_framed(true);
    let client_options = test_options().with_framed(false);
    let server = start_server(&server_options).await;

    let (mut client, closer) = connect(&server.address(), &client_options).await.unwrap();
    assert!(ping(&mut client).await.is_err());

    let _ = closer.close().await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn socket_matrix() {
    for protocol in ProtocolKind::ALL {
        for buffered in [true, false] {
            for framed in [true, false] {
                for secure in [false, true] {
                    let options = test_options()
                        .with_protocol(protocol)
                        .with_buffered(buffered)
                        .with_framed(framed)
                        .with_secure(secure);
                    exchange(&options).await;
                }
            }
        }
    }
}

#[tokio::test]
async fn http_matrix() {
    for protocol in ProtocolKind::ALL {
        for framed in [true, false] {
            for secure in [false, true] {
                let options = test_options()
                    .with_carrier(Carrier::Http)
                    .with_protocol(protocol)
                    .with_framed(framed)
                    .with_secure(secure);
                exchange(&options).await;
            }
        }
    }
}

#[tokio::test]
async fn http_carrier_honours_custom_path() {
    let options = test_options()
        .with_carrier(Carrier::Http)
        .with_http_path("/rpc/v1");
    let server = start_server(&options).await;

    let (mut client, closer) = connect(&server.address(), &options).await.unwrap();
    ping(&mut client).await.unwrap();
    closer.close().await.unwrap();

    let wrong_path = options.clone().with_http_path("/elsewhere");
    let (mut client, closer) = connect(&server.address(), &wrong_path).await.unwrap();
    let err = ping(&mut client).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(TransportError::HttpStatus(404))
    ));
    closer.close().await.unwrap();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_protocol_is_a_configuration_error() {
    let options = test_options();
    let processor = std::sync::Arc::new(common::TestService::default());
    let err = Server::bind_with("127.0.0.1:0", &options, &ProtocolRegistry::empty(), processor)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigError::UnknownProtocol(_))
    ));

    let mut only_binary = ProtocolRegistry::empty();
    only_binary.register(std::sync::Arc::new(
        thrift_stack::protocol::binary::BinaryProtocolFactory,
    ));
    let err = ClientBuilder::new(options.with_protocol(ProtocolKind::Compact))
        .protocols(only_binary)
        .connect("127.0.0.1:1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigError::UnknownProtocol(ref p)) if p == "compact"
    ));
}

#[tokio::test]
async fn secure_servers_each_issue_their_own_chain() {
    let options = test_options().with_secure(true);
    let first = start_server(&options).await;
    let second = start_server(&options).await;

    let first_root = first.trust.clone().expect("secure server has a root");
    let second_root = second.trust.clone().expect("secure server has a root");
    assert_ne!(first_root.ca_der(), second_root.ca_der());

    let (mut a, close_a) = connect(&first.address(), &options).await.unwrap();
    let (mut b, close_b) = connect(&second.address(), &options).await.unwrap();
    ping(&mut a).await.unwrap();
    ping(&mut b).await.unwrap();
    assert_ne!(a.peer_certificate(), b.peer_certificate());

    close_a.close().await.unwrap();
    close_b.close().await.unwrap();
    first.stop().await.unwrap();
    second.stop().await.unwrap();
}

#[tokio::test]
async fn trusted_clients_verify_the_chain() {
    let options = test_options().with_secure(true);
    let server = start_server(&options).await;
    let other = start_server(&options).await;
    let root = server.trust.clone().unwrap();

    let (mut client, closer) = ClientBuilder::new(options.clone())
        .trust(root.clone())
        .connect(&server.address())
        .await
        .unwrap();
    ping(&mut client).await.unwrap();
    closer.close().await.unwrap();

    let (mut client, closer) = ClientBuilder::new(options.clone())
        .trust(root.clone())
        .server_name(LEAF_HOSTNAME)
        .connect(&server.address())
        .await
        .unwrap();
    ping(&mut client).await.unwrap();
    closer.close().await.unwrap();

    let err = ClientBuilder::new(options.clone())
        .trust(root)
        .connect(&other.address())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Handshake { .. })));

    server.stop().await.unwrap();
    other.stop().await.unwrap();
}

#[tokio::test]
async fn oneway_calls_reach_the_processor() {
    let options = test_options();
    let server = start_server(&options).await;
    let (mut client, closer) = connect(&server.address(), &options).await.unwrap();

    client
        .oneway(
            "notify",
            &NotifyArgs {
                message: "hello".to_string(),
            },
        )
        .await
        .unwrap();
    // Requests on one connection are handled in order.
    ping(&mut client).await.unwrap();
    assert_eq!(server.service.notifications(), vec!["hello".to_string()]);

    closer.close().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn exceptions_surface_and_keep_the_connection_usable() {
    for protocol in [ProtocolKind::Binary, ProtocolKind::Compact, ProtocolKind::Json] {
        let options = test_options().with_protocol(protocol);
        let server = start_server(&options).await;
        let (mut client, closer) = connect(&server.address(), &options).await.unwrap();

        let err = tokio::time::timeout(CALL_TIMEOUT, client.call::<_, Empty>("missing", &Empty))
            .await
            .unwrap()
            .unwrap_err();
        match err {
            Error::Application(e) => assert_eq!(e.kind, ApplicationErrorKind::UnknownMethod),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = tokio::time::timeout(CALL_TIMEOUT, client.call::<_, Empty>("fail", &Empty))
            .await
            .unwrap()
            .unwrap_err();
        match err {
            Error::Application(e) => {
                assert_eq!(e.kind, ApplicationErrorKind::InternalError);
                assert_eq!(e.message, "fail called");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        ping(&mut client).await.unwrap();
        closer.close().await.unwrap();
        server.stop().await.unwrap();
    }
}

#[tokio::test]
async fn closed_clients_refuse_calls() {
    let options = test_options();
    let server = start_server(&options).await;
    let (mut client, closer) = connect(&server.address(), &options).await.unwrap();

    ping(&mut client).await.unwrap();
    closer.close().await.unwrap();

    let err = ping(&mut client).await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Closed)));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn many_clients_share_one_server() {
    let options = test_options().with_protocol(ProtocolKind::Compact);
    let server = start_server(&options).await;
    let address = server.address();

    let mut tasks = Vec::new();
    for id in 0..8 {
        let options = options.clone();
        let address = address.clone();
        tasks.push(tokio::spawn(async move {
            let (mut client, closer) = connect(&address, &options).await.unwrap();
            for round in 0..5 {
                let payload = Payload {
                    id: id * 100 + round,
                    ..Payload::sample()
                };
                assert_eq!(echo(&mut client, payload.clone()).await.unwrap(), payload);
            }
            closer.close().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    server.stop().await.unwrap();
}
