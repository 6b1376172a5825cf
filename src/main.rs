use quarry::app;

#[tokio::main]
async fn main() {
    let code = app::run(std::env::args().skip(1).collect()).await;
    std::process::exit(code);
}
