#[actix_web::main]
async fn main() -> std::io::Result<()> {
    datalens_lib::run().await
}
