use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{doc, to_bson, DateTime};
use mongodb::options::{ClientOptions, FullDocumentType, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use secrecy::ExposeSecret;

use super::{PaymentStore, StatusStream};
use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::models::payment::{PaymentOutcome, PaymentRecord, StatusChange};

const PAYMENTS: &str = "payments";

/// MongoDB-backed store. Row-level notifications come from change streams,
/// which need a replica set or a hosted cluster.
#[derive(Clone)]
pub struct MongoPaymentStore {
    db: Database,
    payments: Collection<PaymentRecord>,
}

impl MongoPaymentStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(config.url.expose_secret()).await?;
        client_options.app_name = Some("stk-relay".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.name);

        let store = MongoPaymentStore::new(db);
        store.init_indexes().await?;

        tracing::info!(database = %config.name, "Connected to MongoDB");
        Ok(store)
    }

    pub fn new(db: Database) -> Self {
        let payments = db.collection(PAYMENTS);
        MongoPaymentStore { db, payments }
    }

    /// Unique index on `public_id`; every lookup and update goes through it.
    pub async fn init_indexes(&self) -> Result<()> {
        let public_id_index = IndexModel::builder()
            .keys(doc! { "public_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("public_id_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.payments.create_index(public_id_index).await?;
        Ok(())
    }
}

fn bson_of<T: serde::Serialize>(value: &T) -> Result<mongodb::bson::Bson> {
    to_bson(value).map_err(|e| AppError::persistence(format!("Serialization error: {}", e)))
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<()> {
        self.payments.insert_one(record).await?;
        Ok(())
    }

    async fn find(&self, public_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .payments
            .find_one(doc! { "public_id": public_id })
            .await?)
    }

    async fn update_status(&self, public_id: &str, outcome: &PaymentOutcome) -> Result<u64> {
        let update = doc! {
            "$set": {
                "status": bson_of(&outcome.status)?,
                "result_code": outcome.result_code,
                "result_desc": bson_of(&outcome.result_desc)?,
                "mpesa_receipt_number": bson_of(&outcome.mpesa_receipt_number)?,
                "updated_at": DateTime::now(),
            }
        };

        let result = self
            .payments
            .update_one(doc! { "public_id": public_id }, update)
            .await?;
        Ok(result.matched_count)
    }

    async fn subscribe(&self, public_id: &str) -> Result<StatusStream> {
        let pipeline = [doc! {
            "$match": {
                "operationType": { "$in": ["update", "replace"] },
                "fullDocument.public_id": public_id,
            }
        }];

        let changes = self
            .payments
            .watch()
            .pipeline(pipeline)
            .full_document(FullDocumentType::UpdateLookup)
            .await?;

        let stream = changes.filter_map(|event| async move {
            match event {
                Ok(event) => event.full_document.map(|record| {
                    Ok(StatusChange {
                        public_id: record.public_id,
                        status: record.status,
                    })
                }),
                Err(e) => Some(Err(AppError::from(e))),
            }
        });

        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}
