use amber_api::AmberClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let api_key = std::env::var("AMBER_API_KEY").expect("AMBER_API_KEY is not set.");
    let client = AmberClient::new(api_key).expect("Creating the client failed.");

    let sites = client.get_sites().await.expect("Querying sites failed.");
    let Some(site) = sites.first() else {
        println!("No sites linked to this API key.");
        return;
    };

    println!("Current prices for NMI {}:", site.nmi);
    for price in client
        .get_current_prices(site)
        .await
        .expect("Querying current prices failed.")
    {
        println!("{:>8}: {:.02} c/kWh", price.channel_type, price.per_kwh);
    }

    println!("Forecast for the next 24 hours:");
    for price in client
        .get_forecast_general_prices(site)
        .await
        .expect("Querying forecast prices failed.")
    {
        println!(
            "{} - {}: {:.02} c/kWh ({:.0}% renewables)",
            price.start_time, price.end_time, price.per_kwh, price.renewables
        );
    }
}
