//! Shared test service: argument and result structs written the way generated
//! service code writes them, plus a processor and server helpers.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use thrift_stack::error::Error;
use thrift_stack::lifecycle::{ServerState, Shutdown};
use thrift_stack::observability::logging::init_logging;
use thrift_stack::protocol::{
    ApplicationErrorKind, ApplicationException, FieldIdentifier, FieldType, InputProtocol,
    ListIdentifier, MapIdentifier, OutputProtocol, ProtocolError, Serializable, StructIdentifier,
};
use thrift_stack::rpc::processor::{reject_unknown_method, write_exception, write_reply};
use thrift_stack::{Options, Processor, Server, TrustBundle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub id: i64,
    pub text: String,
    pub ratio: f64,
    pub flag: bool,
    pub tags: Vec<String>,
    pub counts: BTreeMap<String, i32>,
    pub blob: Vec<u8>,
}

impl Payload {
    pub fn sample() -> Self {
        Payload {
            id: -42,
            text: "héllo \"thrift\"".to_string(),
            ratio: 0.25,
            flag: true,
            tags: vec!["a".to_string(), "b".to_string()],
            counts: BTreeMap::from([("x".to_string(), 1), ("y".to_string(), -7)]),
            blob: vec![0, 1, 2, 254, 255],
        }
    }
}

impl Serializable for Payload {
    fn write_to_out_protocol(&self, o: &mut dyn OutputProtocol) -> Result<()> {
        o.write_struct_begin(&StructIdentifier::new("Payload"))?;
        o.write_field_begin(&FieldIdentifier::new("id", FieldType::I64, 1))?;
        o.write_i64(self.id)?;
        o.write_field_end()?;
        o.write_field_begin(&FieldIdentifier::new("text", FieldType::String, 2))?;
        o.write_string(&self.text)?;
        o.write_field_end()?;
        o.write_field_begin(&FieldIdentifier::new("ratio", FieldType::Double, 3))?;
        o.write_double(self.ratio)?;
        o.write_field_end()?;
        o.write_field_begin(&FieldIdentifier::new("flag", FieldType::Bool, 4))?;
        o.write_bool(self.flag)?;
        o.write_field_end()?;
        o.write_field_begin(&FieldIdentifier::new("tags", FieldType::List, 5))?;
        o.write_list_begin(&ListIdentifier::new(FieldType::String, self.tags.len() as i32))?;
        for tag in &self.tags {
            o.write_string(tag)?;
        }
        o.write_list_end()?;
        o.write_field_end()?;
        o.write_field_begin(&FieldIdentifier::new("counts", FieldType::Map, 6))?;
        o.write_map_begin(&MapIdentifier::new(
            FieldType::String,
            FieldType::I32,
            self.counts.len() as i32,
        ))?;
        for (k, v) in &self.counts {
            o.write_string(k)?;
            o.write_i32(*v)?;
        }
        o.write_map_end()?;
        o.write_field_end()?;
        o.write_field_begin(&FieldIdentifier::new("blob", FieldType::String, 7))?;
        o.write_bytes(&self.blob)?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()
    }

    fn read_from_in_protocol(i: &mut dyn InputProtocol) -> Result<Self> {
        let mut payload = Payload::default();
        i.read_struct_begin()?;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == FieldType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), FieldType::I64) => payload.id = i.read_i64()?,
                (Some(2), FieldType::String) => payload.text = i.read_string()?,
                (Some(3), FieldType::Double) => payload.ratio = i.read_double()?,
                (Some(4), FieldType::Bool) => payload.flag = i.read_bool()?,
                (Some(5), FieldType::List) => {
                    let list = i.read_list_begin()?;
                    for _ in 0..list.size {
                        payload.tags.push(i.read_string()?);
                    }
                    i.read_list_end()?;
                }
                (Some(6), FieldType::Map) => {
                    let map = i.read_map_begin()?;
                    for _ in 0..map.size {
                        let k = i.read_string()?;
                        let v = i.read_i32()?;
                        payload.counts.insert(k, v);
                    }
                    i.read_map_end()?;
                }
                (Some(7), FieldType::String) => payload.blob = i.read_bytes()?,
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(payload)
    }
}

/// `echo(1: Payload payload)` arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoArgs {
    pub payload: Payload,
}

impl Serializable for EchoArgs {
    fn write_to_out_protocol(&self, o: &mut dyn OutputProtocol) -> Result<()> {
        o.write_struct_begin(&StructIdentifier::new("echo_args"))?;
        o.write_field_begin(&FieldIdentifier::new("payload", FieldType::Struct, 1))?;
        self.payload.write_to_out_protocol(o)?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()
    }

    fn read_from_in_protocol(i: &mut dyn InputProtocol) -> Result<Self> {
        let mut args = EchoArgs::default();
        i.read_struct_begin()?;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == FieldType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), FieldType::Struct) => args.payload = Payload::read_from_in_protocol(i)?,
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(args)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoResult {
    pub success: Option<Payload>,
}

impl Serializable for EchoResult {
    fn write_to_out_protocol(&self, o: &mut dyn OutputProtocol) -> Result<()> {
        o.write_struct_begin(&StructIdentifier::new("echo_result"))?;
        if let Some(payload) = &self.success {
            o.write_field_begin(&FieldIdentifier::new("success", FieldType::Struct, 0))?;
            payload.write_to_out_protocol(o)?;
            o.write_field_end()?;
        }
        o.write_field_stop()?;
        o.write_struct_end()
    }

    fn read_from_in_protocol(i: &mut dyn InputProtocol) -> Result<Self> {
        let mut result = EchoResult::default();
        i.read_struct_begin()?;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == FieldType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(0), FieldType::Struct) => {
                    result.success = Some(Payload::read_from_in_protocol(i)?)
                }
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(result)
    }
}

/// `oneway void notify(1: string message)` arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyArgs {
    pub message: String,
}

impl Serializable for NotifyArgs {
    fn write_to_out_protocol(&self, o: &mut dyn OutputProtocol) -> Result<()> {
        o.write_struct_begin(&StructIdentifier::new("notify_args"))?;
        o.write_field_begin(&FieldIdentifier::new("message", FieldType::String, 1))?;
        o.write_string(&self.message)?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()
    }

    fn read_from_in_protocol(i: &mut dyn InputProtocol) -> Result<Self> {
        let mut args = NotifyArgs::default();
        i.read_struct_begin()?;
        loop {
            let field = i.read_field_begin()?;
            if field.field_type == FieldType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (Some(1), FieldType::String) => args.message = i.read_string()?,
                (_, other) => i.skip(other)?,
            }
            i.read_field_end()?;
        }
        i.read_struct_end()?;
        Ok(args)
    }
}

pub use thrift_stack::rpc::processor::Empty;

/// Service with `ping`, `echo`, `notify` (oneway) and `fail`.
#[derive(Debug, Default)]
pub struct TestService {
    pub notifications: Mutex<Vec<String>>,
}

impl TestService {
    pub fn notifications(&self) -> Vec<String> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Processor for TestService {
    fn process(&self, i: &mut dyn InputProtocol, o: &mut dyn OutputProtocol) -> Result<()> {
        let call = i.read_message_begin()?;
        match call.name.as_str() {
            "ping" => {
                Empty::read_from_in_protocol(i)?;
                i.read_message_end()?;
                write_reply(o, "ping", call.sequence_number, &Empty)
            }
            "echo" => {
                let args = EchoArgs::read_from_in_protocol(i)?;
                i.read_message_end()?;
                let result = EchoResult {
                    success: Some(args.payload),
                };
                write_reply(o, "echo", call.sequence_number, &result)
            }
            "notify" => {
                let args = NotifyArgs::read_from_in_protocol(i)?;
                i.read_message_end()?;
                if let Ok(mut seen) = self.notifications.lock() {
                    seen.push(args.message);
                }
                Ok(())
            }
            "fail" => {
                Empty::read_from_in_protocol(i)?;
                i.read_message_end()?;
                let exception =
                    ApplicationException::new(ApplicationErrorKind::InternalError, "fail called");
                write_exception(o, "fail", call.sequence_number, &exception)
            }
            _ => reject_unknown_method(i, o, &call),
        }
    }
}

/// A server running in the background.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub trust: Option<TrustBundle>,
    pub state: watch::Receiver<ServerState>,
    pub shutdown: Shutdown,
    pub service: Arc<TestService>,
    pub task: JoinHandle<std::result::Result<(), Error>>,
}

impl RunningServer {
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Trigger shutdown and wait for the serve loop to return.
    pub async fn stop(self) -> std::result::Result<(), Error> {
        self.shutdown.trigger();
        self.task.await.expect("serve task panicked")
    }
}

/// Options small enough to keep secure tests quick.
pub fn test_options() -> Options {
    let mut options = Options::default();
    options.certificate.key_bits = 2048;
    options
}

/// Bind on an ephemeral loopback port and serve in the background.
pub async fn start_server(options: &Options) -> RunningServer {
    init_logging(&options.observability);
    let service = Arc::new(TestService::default());
    let server = Server::bind("127.0.0.1:0", options, service.clone())
        .await
        .expect("server should bind");
    let addr = server.local_addr();
    let trust = server.trust_bundle();
    let mut state = server.state();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(shutdown.subscribe()));
    state
        .wait_for(|s| *s >= ServerState::Serving)
        .await
        .expect("state channel open");

    RunningServer {
        addr,
        trust,
        state,
        shutdown,
        service,
        task,
    }
}
