//! MongoDB record store.
//!
//! # Responsibilities
//! - Connect with the configured URI and credentials
//! - Ping the configured database to prove reachability
//! - Insert one document per record
//!
//! # Document layout
//! ```text
//! { _id: UUID, pod, service, method, url,
//!   request:  { headers: { name: [values] }, format, body },
//!   response: { headers: { name: [values] }, format, body },
//!   time: Date, elapsed_us: Int64, status_code: Int32 }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Binary, Bson, Document};
use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Collection};

use crate::config::MongoConfig;
use crate::recording::{Payload, Record, RecordedMessage};
use crate::store::{RecordStore, StoreError};

/// Store backed by a MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: String,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Build a client for `config`. The driver connects lazily; use
    /// [`check_reachable`](RecordStore::check_reachable) to find out whether
    /// the server answers.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "Creating MongoDB store"
        );

        let mut options = ClientOptions::parse(config.uri.as_str()).await?;
        if !config.username.is_empty() {
            let mut credential = Credential::default();
            credential.username = Some(config.username.clone());
            credential.password = Some(config.password.clone());
            options.credential = Some(credential);
        }
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options)?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        Ok(Self {
            client,
            database: config.database.clone(),
            collection,
        })
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn store(&self, record: &Record) -> Result<(), StoreError> {
        let document = to_document(record)?;
        self.collection.insert_one(document).await?;
        Ok(())
    }

    async fn check_reachable(&self) -> Result<(), StoreError> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        tracing::info!("MongoDB client shut down");
    }
}

/// Encode a record as a BSON document.
pub fn to_document(record: &Record) -> Result<Document, StoreError> {
    let id = Binary::from_uuid(bson::Uuid::from_bytes(record.id.into_bytes()));

    Ok(doc! {
        "_id": id,
        "pod": record.pod.as_str(),
        "service": record.service.as_str(),
        "method": record.method.as_str(),
        "url": record.url.as_str(),
        "request": message_document(&record.request)?,
        "response": message_document(&record.response)?,
        "time": bson::DateTime::from_millis(record.time.timestamp_millis()),
        "elapsed_us": record.elapsed_us,
        "status_code": i32::from(record.status_code),
    })
}

fn message_document(message: &RecordedMessage) -> Result<Document, StoreError> {
    let mut headers = Document::new();
    for (name, values) in &message.headers {
        headers.insert(name.as_str(), values.clone());
    }

    let body = match &message.body {
        Payload::Text(text) => Bson::String(text.clone()),
        Payload::Json(value) => bson::to_bson(value)?,
    };

    Ok(doc! {
        "headers": headers,
        "format": message.format.as_str(),
        "body": body,
    })
}
