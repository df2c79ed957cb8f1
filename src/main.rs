use drive_digest::{
    api::{self, AppState},
    auth::OAuthClient,
    config,
    drive::GoogleDriveSource,
    logging,
    processing::{ChunkedSummarizer, ProcessingService},
    summarization::{GroqSummarizationClient, SummarizationClient},
};
use std::{io, net::Ipv4Addr, ops::RangeInclusive, sync::Arc};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let client: Arc<dyn SummarizationClient> = Arc::new(
        GroqSummarizationClient::from_config(config)
            .expect("Failed to initialize summarization client"),
    );
    let summarizer = ChunkedSummarizer::from_config(client, config)
        .expect("Failed to initialize chunked summarizer");
    let source =
        GoogleDriveSource::from_config(config).expect("Failed to initialize Drive client");
    let service = ProcessingService::from_config(Arc::new(source), Arc::new(summarizer), config);
    let oauth = OAuthClient::from_config(config).expect("Failed to initialize OAuth client");
    let app = api::create_router(Arc::new(AppState::new(Arc::new(service), oauth)));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .expect("Failed to bind listener");
    tracing::info!(port, "Drive Digest listening on http://localhost:{port}");
    axum::serve(listener, app).await.expect("Server error");
}

const FALLBACK_PORTS: RangeInclusive<u16> = 4100..=4199;

/// Bind the configured port, or the first free port in the fallback range.
async fn bind_listener(configured: Option<u16>) -> io::Result<(TcpListener, u16)> {
    if let Some(port) = configured {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    for port in FALLBACK_PORTS {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port in use");
            }
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!(
            "no free port between {} and {}",
            FALLBACK_PORTS.start(),
            FALLBACK_PORTS.end()
        ),
    ))
}
