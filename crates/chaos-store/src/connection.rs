use mongodb::Client;

use crate::config::StoreConfig;

pub async fn create_client(config: &StoreConfig) -> anyhow::Result<Client> {
    let client = Client::with_uri_str(&config.connection_url).await?;
    Ok(client)
}
