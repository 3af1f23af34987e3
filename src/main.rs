use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;

use blockchain::{Address, Blockchain, ChainStore, Wallets};
use config::Config;

// Open the chain at the configured location, creating it with a genesis block if absent
fn initialize_blockchain(config: &Config, wallets: &mut Wallets) -> anyhow::Result<Blockchain> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {}", config.data_dir.display()))?;

    let store = ChainStore::open(&config.data_dir)
        .with_context(|| format!("Failed to open chain storage at {}", config.data_dir.display()))?;

    if store.has_chain()? {
        let chain = Blockchain::open(store)?;
        info!(
            "Loaded blockchain from {} at height {}",
            config.data_dir.display(),
            chain.height()?
        );
        return Ok(chain);
    }

    let genesis_address = match &config.genesis_address {
        Some(address) => address.parse::<Address>()?,
        None => {
            let address = wallets.add_wallet();
            wallets.save_file(&config.wallet_file)?;
            info!("Created genesis wallet with address: {}", address);
            address
        }
    };

    let chain = Blockchain::create(store, &genesis_address.pub_key_hash()?)?;
    info!("Created new blockchain paying genesis reward to {}", genesis_address);
    Ok(chain)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::create_wallet,
        api::handlers::list_wallets,
        api::handlers::get_balance,
        api::handlers::get_unspent,
        api::handlers::send_transaction,
        api::handlers::get_transaction
    ),
    components(
        schemas(
            api::schema::BlockView,
            api::schema::TransactionView,
            api::schema::InputView,
            api::schema::OutputView,
            api::handlers::ChainResponse,
            api::handlers::TransferRequest,
            api::handlers::TransferResponse,
            api::handlers::WalletResponse,
            api::handlers::BalanceResponse
        )
    ),
    tags(
        (name = "ledger", description = "UTXO ledger API endpoints")
    ),
    info(
        title = "UTXO Ledger API",
        version = "1.0.0",
        description = "A single-node proof-of-work UTXO ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env()?;
    let mut wallets = Wallets::load_file(&config.wallet_file)
        .with_context(|| format!("Failed to load wallets from {}", config.wallet_file.display()))?;

    if wallets.is_empty() {
        info!("No wallets found at {}", config.wallet_file.display());
    } else {
        info!("Node holds {} wallet(s)", wallets.len());
    }

    let chain = initialize_blockchain(&config, &mut wallets)?;
    let state = web::Data::new(api::handlers::AppState::new(chain, wallets, config.wallet_file.clone()));

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
