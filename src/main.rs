#[actix_web::main]
async fn main() {
    if let Err(err) = clbp_predict::app::run().await {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}
