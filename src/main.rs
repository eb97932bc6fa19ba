use lantern::config::Config;
use lantern::http::request::Request;
use lantern::http::response::{MIME_PLAINTEXT, Response, StatusCode};
use lantern::server::Server;

/// Echoes what the server decoded from the request.
fn echo(req: &mut Request) -> anyhow::Result<Response> {
    let mut body = format!("{} {} {}\n", req.method, req.uri, req.version);

    let mut params: Vec<_> = req.params.iter().collect();
    params.sort();
    for (key, value) in params {
        body.push_str(&format!("param {key} = {value}\n"));
    }

    let mut files: Vec<_> = req.files.iter().collect();
    files.sort();
    for (key, path) in files {
        body.push_str(&format!("file {key} -> {path}\n"));
    }

    Ok(Response::text(StatusCode::Ok, MIME_PLAINTEXT, &body))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let server = Server::bind(&cfg, echo).await?;

    tokio::select! {
        res = server.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            server.shutdown();
        }
    }

    Ok(())
}
