use axum::{extract::Request, middleware::Next, response::Response};
use owo_colors::OwoColorize;
use std::time::Instant;

pub async fn public(req: Request, next: Next) -> Response {
    log("pub", req, next).await
}

async fn log(tag: &'static str, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let res = next.run(req).await;
    let status = res.status().as_u16();
    let elapsed_ms = start.elapsed().as_millis();
    if res.status().is_success() {
        println!(
            "{} {} {} {} {}",
            tag.dimmed(),
            method.to_string().blue(),
            path,
            status.green(),
            format!("{elapsed_ms}ms").dimmed(),
        );
    } else {
        println!(
            "{} {} {} {} {}",
            tag.dimmed(),
            method.to_string().blue(),
            path,
            status.red(),
            format!("{elapsed_ms}ms").dimmed(),
        );
    }
    res
}
