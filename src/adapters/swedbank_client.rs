use {
    crate::config::GatewayConfig,
    crate::domain::{
        id::{PaymentId, PaymentOrderId},
        money::MoneyAmount,
        problem::Problem,
        provider::{
            Operation, PaymentGatewayClient, PaymentInfo, ProviderError, ProviderFuture,
            TokenSource, TransactionOperation, TransactionRequest,
        },
        transaction::Transaction,
    },
    reqwest::{Client, RequestBuilder},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
};

const ABORT_REASON: &str = "CancelledByConsumer";

/// Swedbank Pay REST client.
pub struct SwedbankClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl SwedbankClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, ProviderError> {
        let user_agent = match config.user_agent.as_deref() {
            Some(extra) => format!("{}/{} {extra}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProviderError::transport(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn url(&self, resource: &str) -> String {
        if resource.starts_with("http://") || resource.starts_with("https://") {
            resource.to_string()
        } else {
            format!("{}/{}", self.base_url, resource.trim_start_matches('/'))
        }
    }

    async fn get<T: DeserializeOwned>(&self, resource: &str) -> Result<T, ProviderError> {
        self.send(self.client.get(self.url(resource))).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "provider returned an error response");
            return Err(match serde_json::from_str::<Problem>(&body) {
                Ok(problem) => ProviderError::from_problem(status.as_u16(), problem),
                Err(_) => ProviderError {
                    status: Some(status.as_u16()),
                    problem: None,
                    message: format!("HTTP {}: {body}", status.as_u16()),
                },
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::transport(format!("invalid provider response: {e}")))
    }

    async fn fetch_payment_info_inner(&self, resource: &str) -> Result<PaymentInfo, ProviderError> {
        let response: InfoResponse = self.get(resource).await?;
        let node = response
            .payment
            .or(response.payment_order)
            .ok_or_else(|| ProviderError::transport("response has no payment or paymentOrder"))?;

        Ok(PaymentInfo {
            state: node.state,
            remaining_capture_amount: node.remaining_capture_amount,
            remaining_cancellation_amount: node.remaining_cancellation_amount,
            remaining_reversal_amount: node.remaining_reversal_amount,
            operations: response.operations,
        })
    }

    async fn payment_id_inner(
        &self,
        payment_order_id: &PaymentOrderId,
    ) -> Result<Option<PaymentId>, ProviderError> {
        let response: CurrentPaymentResponse = self
            .get(&format!("{}/currentpayment", payment_order_id.as_str()))
            .await?;

        response
            .payment
            .and_then(|p| p.id)
            .map(|id| PaymentId::new(id).map_err(|e| ProviderError::transport(e.to_string())))
            .transpose()
    }

    async fn send_transaction_inner(
        &self,
        request: &TransactionRequest,
    ) -> Result<Transaction, ProviderError> {
        let path = match request.operation {
            TransactionOperation::Capture => "captures",
            TransactionOperation::Cancellation => "cancellations",
            TransactionOperation::Reversal => "reversals",
        };
        let body = TransactionBody {
            transaction: TransactionFields {
                amount: request.amount,
                vat_amount: request.vat_amount,
                description: &request.description,
                payee_reference: &request.payee_reference,
            },
        };

        let url = self.url(&format!("{}/{path}", request.target.as_str()));
        let response: TransactionResponse = self.send(self.client.post(url).json(&body)).await?;

        let created = match request.operation {
            TransactionOperation::Capture => response.capture,
            TransactionOperation::Cancellation => response.cancellation,
            TransactionOperation::Reversal => response.reversal,
        };
        created.map(|c| c.transaction).ok_or_else(|| {
            ProviderError::transport(format!(
                "response has no {} transaction",
                request.operation.as_str()
            ))
        })
    }

    async fn abort_inner(&self, href: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "payment": {
                "operation": "Abort",
                "abortReason": ABORT_REASON,
            }
        });
        let response: AbortResponse = self
            .send(self.client.patch(self.url(href)).json(&body))
            .await?;

        response
            .payment
            .and_then(|p| p.state)
            .ok_or_else(|| ProviderError::transport("abort response has no payment state"))
    }
}

impl PaymentGatewayClient for SwedbankClient {
    fn fetch_payment_info<'a>(&'a self, resource: &'a str) -> ProviderFuture<'a, PaymentInfo> {
        Box::pin(self.fetch_payment_info_inner(resource))
    }

    fn payment_id_by_payment_order<'a>(
        &'a self,
        payment_order_id: &'a PaymentOrderId,
    ) -> ProviderFuture<'a, Option<PaymentId>> {
        Box::pin(self.payment_id_inner(payment_order_id))
    }

    fn fetch_transactions<'a>(&'a self, payment_id: &'a PaymentId) -> ProviderFuture<'a, Vec<Transaction>> {
        Box::pin(async move {
            let response: TransactionsResponse = self
                .get(&format!("{}/transactions", payment_id.as_str()))
                .await?;
            Ok(response.transactions.transaction_list)
        })
    }

    fn fetch_verifications<'a>(&'a self, payment_id: &'a PaymentId) -> ProviderFuture<'a, Vec<TokenSource>> {
        Box::pin(async move {
            let response: VerificationsResponse = self
                .get(&format!("{}/verifications", payment_id.as_str()))
                .await?;
            Ok(response.verifications.verification_list)
        })
    }

    fn fetch_authorizations<'a>(&'a self, payment_id: &'a PaymentId) -> ProviderFuture<'a, Vec<TokenSource>> {
        Box::pin(async move {
            let response: AuthorizationsResponse = self
                .get(&format!("{}/authorizations", payment_id.as_str()))
                .await?;
            Ok(response.authorizations.authorization_list)
        })
    }

    fn send_transaction<'a>(&'a self, request: &'a TransactionRequest) -> ProviderFuture<'a, Transaction> {
        Box::pin(self.send_transaction_inner(request))
    }

    fn abort<'a>(&'a self, href: &'a str) -> ProviderFuture<'a, String> {
        Box::pin(self.abort_inner(href))
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    #[serde(default)]
    payment: Option<InfoNode>,
    #[serde(default)]
    payment_order: Option<InfoNode>,
    #[serde(default)]
    operations: Vec<Operation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoNode {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    remaining_capture_amount: Option<MoneyAmount>,
    #[serde(default)]
    remaining_cancellation_amount: Option<MoneyAmount>,
    #[serde(default)]
    remaining_reversal_amount: Option<MoneyAmount>,
}

#[derive(Deserialize)]
struct CurrentPaymentResponse {
    #[serde(default)]
    payment: Option<IdNode>,
}

#[derive(Deserialize)]
struct IdNode {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    transactions: TransactionList,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionList {
    #[serde(default)]
    transaction_list: Vec<Transaction>,
}

#[derive(Deserialize)]
struct VerificationsResponse {
    verifications: VerificationList,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationList {
    #[serde(default)]
    verification_list: Vec<TokenSource>,
}

#[derive(Deserialize)]
struct AuthorizationsResponse {
    authorizations: AuthorizationList,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationList {
    #[serde(default)]
    authorization_list: Vec<TokenSource>,
}

#[derive(Serialize)]
struct TransactionBody<'a> {
    transaction: TransactionFields<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionFields<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<MoneyAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vat_amount: Option<MoneyAmount>,
    description: &'a str,
    payee_reference: &'a str,
}

#[derive(Deserialize)]
struct CreatedTransaction {
    transaction: Transaction,
}

#[derive(Deserialize)]
struct TransactionResponse {
    #[serde(default)]
    capture: Option<CreatedTransaction>,
    #[serde(default)]
    cancellation: Option<CreatedTransaction>,
    #[serde(default)]
    reversal: Option<CreatedTransaction>,
}

#[derive(Deserialize)]
struct AbortResponse {
    #[serde(default)]
    payment: Option<StateNode>,
}

#[derive(Deserialize)]
struct StateNode {
    #[serde(default)]
    state: Option<String>,
}
