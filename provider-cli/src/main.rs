//! Provider CLI
//!
//! Operator tools for the reseller API and the payment gateway: sign and
//! verify RSA2 headers, fetch a token, call reseller operations and open
//! payment sessions. Endpoints and keys come from the same environment
//! variables the server reads.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;

use provider_client::{
    CredentialManager, GatewayClient, HttpConfig, KeySource, Payer, ProviderConfig, RequestContext,
    RequestSigner, ReqwestHttp, ResellerClient, ResellerOperation, SignatureVerifier, Transport,
    DEFAULT_USAGE_CONCURRENCY,
};
use provider_types::domain::PaymentMethod;
use provider_types::dto::CreatePaymentRequest;
use provider_types::{SystemClock, TokenProvider};

#[derive(Parser)]
#[command(name = "provider")]
#[command(author, version, about = "Provider integration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print Authorization and X-Appid headers for a gateway request
    Sign {
        #[arg(long, default_value = "POST")]
        method: String,
        /// Request path, e.g. /v1/gateway/v1/acquiring/pay_session
        #[arg(long)]
        path: String,
        /// Exact request body
        #[arg(long, default_value = "")]
        body: String,
        /// PKCS#1 or PKCS#8 private key
        #[arg(long, env = "GATEWAY_CLIENT_PRIVATE_KEY_PATH")]
        key: PathBuf,
        #[arg(long, env = "GATEWAY_APPID")]
        app_id: String,
        /// Unix time in milliseconds; defaults to now
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Check a gateway signature against a public key
    Verify {
        #[arg(long, default_value = "POST")]
        method: String,
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Full Authorization header value
        #[arg(long)]
        authorization: String,
        #[arg(long)]
        app_id: String,
        /// PKCS#1 or SubjectPublicKeyInfo public key
        #[arg(long, env = "GATEWAY_SERVER_PUBLIC_KEY_PATH")]
        key: PathBuf,
    },
    /// Obtain a reseller access token
    Token {
        /// Force a fresh login instead of reusing a configured token
        #[arg(long)]
        refresh: bool,
        /// Print the whole token
        #[arg(long)]
        reveal: bool,
    },
    /// Call a reseller operation and print the envelope data
    Reseller {
        /// Operation name, e.g. orders.list or bundle.networks
        operation: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Usage for one or more orders
    Usage {
        /// Order references
        #[arg(required = true)]
        references: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_USAGE_CONCURRENCY)]
        concurrency: usize,
    },
    /// Open a hosted checkout session at the gateway
    CreatePayment {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        currency: Option<String>,
        /// alipay, card, applepay or paypal
        #[arg(long, default_value = "card")]
        method: String,
        #[arg(long)]
        buyer_id: Option<String>,
    },
    /// Start a local listener that verifies and prints gateway webhooks
    Listen {
        /// Port to listen on
        #[arg(long, default_value = "3000")]
        port: u16,
    },
}

fn parse_method(s: &str) -> Result<PaymentMethod> {
    match s.to_lowercase().as_str() {
        "alipay" => Ok(PaymentMethod::Alipay),
        "card" => Ok(PaymentMethod::Card),
        "applepay" => Ok(PaymentMethod::Applepay),
        "paypal" => Ok(PaymentMethod::Paypal),
        _ => anyhow::bail!(
            "Unknown payment method: {}. Supported: alipay, card, applepay, paypal",
            s
        ),
    }
}

/// Keeps the first characters of a token so it can be recognised without being leaked.
fn mask(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{}… ({} chars)", prefix, token.chars().count())
}

fn credentials(config: &ProviderConfig) -> Result<Arc<CredentialManager>> {
    let http = Arc::new(ReqwestHttp::new(&config.http)?);
    Ok(Arc::new(CredentialManager::new(
        config.credentials.clone(),
        http,
        Arc::new(SystemClock),
    )))
}

fn reseller(config: &ProviderConfig) -> Result<ResellerClient> {
    let http = Arc::new(ReqwestHttp::new(&config.http)?);
    let transport = Transport::new(&config.reseller, config.retry, http, credentials(config)?);
    Ok(ResellerClient::new(
        Arc::new(transport),
        config.reseller.clone(),
    ))
}

fn gateway(config: &ProviderConfig) -> Result<GatewayClient> {
    let http = Arc::new(ReqwestHttp::new(&HttpConfig {
        timeout: config.gateway.timeout,
        ..config.http.clone()
    })?);
    Ok(GatewayClient::new(config.gateway.clone(), http, config.retry))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ProviderConfig::from_env();
    let ctx = RequestContext::new();

    match cli.command {
        Commands::Sign {
            method,
            path,
            body,
            key,
            app_id,
            timestamp,
        } => {
            let signer = RequestSigner::new(app_id, Some(KeySource::File(key)));
            let method = method.to_uppercase();
            let headers = match timestamp {
                Some(ts) => signer.headers_at(&method, &path, body.as_bytes(), &ts)?,
                None => signer.headers(&method, &path, body.as_bytes())?,
            };
            println!("Authorization: {}", headers.authorization);
            println!("X-Appid: {}", headers.app_id);
        }

        Commands::Verify {
            method,
            path,
            body,
            authorization,
            app_id,
            key,
        } => {
            let verifier = SignatureVerifier::new(Some(KeySource::File(key)));
            match verifier.verify(
                &method.to_uppercase(),
                &path,
                Some(&authorization),
                Some(&app_id),
                body.as_bytes(),
            ) {
                Ok(()) => println!("✓ Signature is valid"),
                Err(e) => {
                    println!("✗ Signature rejected: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Token { refresh, reveal } => {
            let credentials = credentials(&config)?;
            let token = if refresh {
                credentials.refresh().await?
            } else {
                credentials.get_token().await?
            };
            let mode = credentials.mode();
            if reveal {
                println!("{}", token);
            } else {
                println!("{} ({:?})", mask(&token), mode);
            }
        }

        Commands::Reseller { operation, data } => {
            let op: ResellerOperation = operation
                .parse()
                .map_err(|_| anyhow::anyhow!("Unknown reseller operation: {}", operation))?;
            let payload: Value = serde_json::from_str(&data)
                .map_err(|e| anyhow::anyhow!("--data is not valid JSON: {}", e))?;
            let data = reseller(&config)?.send(op, &payload, &ctx).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Usage {
            references,
            concurrency,
        } => {
            let items = reseller(&config)?
                .consumption_batch(&references, concurrency, &ctx)
                .await;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }

        Commands::CreatePayment {
            order_id,
            amount,
            currency,
            method,
            buyer_id,
        } => {
            let request = CreatePaymentRequest {
                order_id,
                method: parse_method(&method)?,
                amount: Some(amount),
                currency,
            };
            let payer = Payer {
                login_id: buyer_id.clone(),
                buyer_id,
                client_ip: None,
            };
            let session = gateway(&config)?
                .create_payment_session(&request, &payer, &ctx)
                .await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }

        Commands::Listen { port } => {
            let verifier = gateway(&config)?.verifier();
            let app = axum::Router::new()
                .fallback(handle_webhook)
                .with_state(verifier);
            let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
            println!("Listening for webhooks on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

async fn handle_webhook(
    axum::extract::State(verifier): axum::extract::State<Arc<SignatureVerifier>>,
    method: axum::http::Method,
    uri: axum::http::Uri,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> impl axum::response::IntoResponse {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    println!("{} {} HTTP/1.1", method, uri);
    for (name, value) in &headers {
        println!("{}: {:?}", name, value);
    }
    println!();
    println!("{}", String::from_utf8_lossy(&body));
    let status = match verifier.verify(
        method.as_str(),
        uri.path(),
        header("authorization"),
        header("x-appid"),
        &body,
    ) {
        Ok(()) => {
            println!("✓ Signature is valid");
            axum::http::StatusCode::OK
        }
        Err(e) => {
            println!("✗ Signature rejected: {}", e);
            axum::http::StatusCode::UNAUTHORIZED
        }
    };
    println!("----------------------------------------");
    status
}
