// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{future::Future, io, sync::Arc};

use axum::{extract::State, http::StatusCode, routing::any, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;

/// Builds the HTTP routes. /play accepts any method and always answers 200 with an empty body,
/// whatever happened to the playback.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/play", any(play))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

async fn play(State(dispatcher): State<Arc<Dispatcher>>) -> StatusCode {
    let trigger = dispatcher.on_trigger().await;
    debug!(
        waveform = trigger.waveform,
        outcome = format!("{:?}", trigger.outcome),
        "Handled trigger."
    );
    StatusCode::OK
}

/// Binds the trigger listener on all interfaces.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Serves triggers on the listener until the shutdown future resolves.
pub async fn serve<F>(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        addr = listener.local_addr()?.to_string(),
        "Listening for triggers."
    );

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server closing.");
    Ok(())
}
