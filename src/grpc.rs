//! gRPC boundary adapter
//!
//! Business failures are soft failures: the RPC itself succeeds with
//! `success = false` and a message, so clients distinguish "the ledger
//! said no" from transport faults. Only `GetBalance` maps domain errors
//! onto gRPC status codes.

use std::sync::Arc;

use chrono::Utc;
use tonic::{Request, Response, Status};
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;
use crate::ledger::Ledger;
use crate::types::{AccountId, Transaction, TransactionType};

/// Generated protobuf types for the `ledger` package.
#[allow(missing_docs)]
pub mod proto {
    tonic::include_proto!("ledger");
}

use proto::ledger_service_server::LedgerService;
use proto::{GetBalanceRequest, GetBalanceResponse, TransferRequest, TransferResponse};

/// gRPC service over the engine facade.
pub struct LedgerGrpcServer {
    ledger: Arc<Ledger>,
}

impl LedgerGrpcServer {
    /// Wrap the engine facade.
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

fn soft_failure(message: String) -> Response<TransferResponse> {
    Response::new(TransferResponse {
        success: false,
        message,
        current_balance: 0,
    })
}

#[tonic::async_trait]
impl LedgerService for LedgerGrpcServer {
    async fn transfer(
        &self,
        request: Request<TransferRequest>,
    ) -> Result<Response<TransferResponse>, Status> {
        let req = request.into_inner();

        let transaction_id = match Uuid::parse_str(&req.ref_id) {
            Ok(id) => id,
            Err(e) => return Ok(soft_failure(format!("invalid ref_id: {e}"))),
        };

        let kind = match proto::TransactionType::try_from(req.r#type) {
            Ok(proto::TransactionType::Deposit) => TransactionType::Deposit,
            Ok(proto::TransactionType::Withdraw) => TransactionType::Withdraw,
            Ok(proto::TransactionType::Transfer) => TransactionType::Transfer,
            _ => return Ok(soft_failure("invalid transaction type".into())),
        };

        let tran = Transaction {
            transaction_id,
            kind,
            from: AccountId::new(req.from_account_id),
            to: AccountId::new(req.to_account_id),
            amount: req.amount,
            sequence: 0,
            created_at_millis: Utc::now().timestamp_millis(),
        };

        if let Err(e) = self.ledger.post(tran).await {
            debug!(%transaction_id, error = %e, "post rejected");
            return Ok(soft_failure(e.to_string()));
        }

        // Best effort: deposits report the credited account, everything
        // else the debited one. Probe errors are ignored.
        let target = match kind {
            TransactionType::Deposit => req.to_account_id,
            _ => req.from_account_id,
        };
        let current_balance = self
            .ledger
            .balance(AccountId::new(target))
            .await
            .unwrap_or(0);

        Ok(Response::new(TransferResponse {
            success: true,
            message: String::new(),
            current_balance,
        }))
    }

    async fn get_balance(
        &self,
        request: Request<GetBalanceRequest>,
    ) -> Result<Response<GetBalanceResponse>, Status> {
        let req = request.into_inner();
        match self.ledger.balance(AccountId::new(req.account_id)).await {
            Ok(balance) => Ok(Response::new(GetBalanceResponse { balance })),
            Err(e @ Error::AccountNotFound(_)) => Err(Status::not_found(e.to_string())),
            Err(e) => Err(Status::internal(e.to_string())),
        }
    }
}
