use porthole::{Config, Request, Response, Server, StatusCode};

fn handle(request: &Request, mut response: Response) {
    if request.method == "GET" && request.url == "/" {
        response
            .header("Content-Type", "text/html")
            .set_body("<html><body>Hello World.</body></html>");
    } else {
        response
            .set_status(StatusCode::NotFound)
            .set_body("<html><body>Not Found</body></html>");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load();
    let mut server = Server::with_config(&cfg)?;
    server.run(handle)
}
