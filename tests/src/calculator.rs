//! # Calculator Application
//!
//! A two-applet application used by the integration tests and benchmarks.
//!
//! ```text
//! CalcClient ── CalcRequest (fan-out) ──► CalcServer
//!     ▲                                        │
//!     └──── CalcResponse / error reply ────────┘
//! ```
//!
//! The server answers division by zero and unknown operation codes with an
//! error reply.

use applet_bus::{
    AppletChannel, ChannelError, DtoSerializer, FanOutRequest, HandlerTable, Payload,
    SerializationError,
};
use applet_types::{
    AppContractBuilder, AppContractTable, AppletId, ContractBuilderError, MessageIntentId,
    PayloadType,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const CLIENT: Uuid = Uuid::from_u128(0x3f0c_5a61_8d2e_4c19_b7a4_1e6d_9c20_f801);
const SERVER: Uuid = Uuid::from_u128(0x3f0c_5a61_8d2e_4c19_b7a4_1e6d_9c20_f802);
const CALC_REQUEST: Uuid = Uuid::from_u128(0x9b41_07de_25c3_4f8a_a6e0_5d17_3b98_c101);
const CALC_REPLY: Uuid = Uuid::from_u128(0x9b41_07de_25c3_4f8a_a6e0_5d17_3b98_c102);

pub fn client_id() -> AppletId {
    AppletId::from_uuid(CLIENT)
}

pub fn server_id() -> AppletId {
    AppletId::from_uuid(SERVER)
}

pub fn calc_request_intent() -> MessageIntentId {
    MessageIntentId::from_uuid(CALC_REQUEST)
}

pub fn calc_reply_intent() -> MessageIntentId {
    MessageIntentId::from_uuid(CALC_REPLY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CalcOperation {
    Add = 1,
    Subtract = 2,
    Multiply = 3,
    Divide = 4,
}

impl TryFrom<u8> for CalcOperation {
    type Error = CalcError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Add),
            2 => Ok(Self::Subtract),
            3 => Ok(Self::Multiply),
            4 => Ok(Self::Divide),
            other => Err(CalcError::UnknownOperation(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown operation code: {0}")]
    UnknownOperation(u8),
}

/// Fan-out request. `op` is a raw code so clients can send unknown ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcRequest {
    pub lhs: f64,
    pub rhs: f64,
    pub op: u8,
}

impl CalcRequest {
    pub fn new(lhs: f64, rhs: f64, op: CalcOperation) -> Self {
        Self {
            lhs,
            rhs,
            op: op as u8,
        }
    }

    pub fn evaluate(&self) -> Result<f64, CalcError> {
        match CalcOperation::try_from(self.op)? {
            CalcOperation::Add => Ok(self.lhs + self.rhs),
            CalcOperation::Subtract => Ok(self.lhs - self.rhs),
            CalcOperation::Multiply => Ok(self.lhs * self.rhs),
            CalcOperation::Divide if self.rhs == 0.0 => Err(CalcError::DivisionByZero),
            CalcOperation::Divide => Ok(self.lhs / self.rhs),
        }
    }
}

impl Payload for CalcRequest {
    const PAYLOAD_TYPE: PayloadType = PayloadType::from_u128(0xc41c_0001_0000_4000_8000_0000_0000_0001);
}

impl FanOutRequest for CalcRequest {
    type Response = CalcResponse;

    fn intent(&self) -> MessageIntentId {
        calc_request_intent()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcResponse {
    pub result: f64,
}

impl Payload for CalcResponse {
    const PAYLOAD_TYPE: PayloadType = PayloadType::from_u128(0xc41c_0002_0000_4000_8000_0000_0000_0002);
}

pub fn calculator_contract() -> Result<AppContractTable, ContractBuilderError> {
    let (client, server) = (client_id(), server_id());
    let (request, reply) = (calc_request_intent(), calc_reply_intent());

    let mut builder = AppContractBuilder::new();
    builder
        .add_message_intent(request.clone(), Some("CalcRequest"))?
        .add_message_intent(reply.clone(), Some("CalcReply"))?
        .add_applet(client.clone(), Some("CalcClient"))?
        .add_applet(server.clone(), Some("CalcServer"))?
        .enable_response_stream(
            &client,
            &request,
            CalcRequest::PAYLOAD_TYPE,
            &reply,
            CalcResponse::PAYLOAD_TYPE,
        )?
        .enable_subscription(&server, &request, CalcRequest::PAYLOAD_TYPE)?
        .enable_broadcast(&server, &reply, CalcResponse::PAYLOAD_TYPE)?;
    builder.build()
}

pub fn calculator_serializer() -> Result<DtoSerializer, SerializationError> {
    DtoSerializer::builder()
        .register::<CalcRequest>()
        .register::<CalcResponse>()
        .build()
}

/// Handlers of the calculator server.
pub fn calculator_handlers(cancel: CancellationToken) -> HandlerTable {
    HandlerTable::builder()
        .route_payload::<CalcRequest, _, _>(calc_request_intent(), move |args, request| {
            let cancel = cancel.clone();
            async move {
                match request.evaluate() {
                    Ok(result) => {
                        args.reply_with(calc_reply_intent(), &CalcResponse { result }, &cancel)
                            .await?
                    }
                    Err(err) => args.reply_with_error(&err.to_string(), &cancel).await?,
                }
                Ok(())
            }
        })
        .build()
}

/// Serve calculator requests on `channel` until `cancel` fires or the
/// channel is disposed.
pub fn spawn_calculator(
    channel: AppletChannel,
    cancel: CancellationToken,
) -> JoinHandle<Result<(), ChannelError>> {
    tokio::spawn(async move {
        channel
            .listen(calculator_handlers(cancel.clone()), &cancel)
            .await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use applet_types::AppContract;

    #[test]
    fn test_evaluate() {
        assert_eq!(CalcRequest::new(1.0, 2.0, CalcOperation::Add).evaluate(), Ok(3.0));
        assert_eq!(CalcRequest::new(6.0, 3.0, CalcOperation::Divide).evaluate(), Ok(2.0));
        assert_eq!(
            CalcRequest::new(1.0, 0.0, CalcOperation::Divide).evaluate(),
            Err(CalcError::DivisionByZero)
        );
        let unknown = CalcRequest {
            lhs: 1.0,
            rhs: 2.0,
            op: 99,
        };
        assert_eq!(unknown.evaluate(), Err(CalcError::UnknownOperation(99)));
    }

    #[test]
    fn test_contract_grants() {
        let contract = calculator_contract().unwrap();
        let (client, server) = (client_id(), server_id());

        assert!(contract.is_valid_request(&client, &calc_request_intent(), CalcRequest::PAYLOAD_TYPE));
        assert!(!contract.is_valid_request(&server, &calc_request_intent(), CalcRequest::PAYLOAD_TYPE));
        assert!(contract.is_valid_response(&client, &calc_reply_intent(), CalcResponse::PAYLOAD_TYPE));
        assert!(contract.is_event_listener(&server));
        assert!(!contract.is_event_listener(&client));
        assert_eq!(contract.get_event_keys(&server).len(), 1);
    }
}
