//! MongoDB driver implementation of the gateway.

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, ReadPreference, SelectionCriteria};
use mongodb::results::CollectionType;
use mongodb::{Client, Collection, Database};

use super::{
    CollectionHandle, CountOptions, CreateIndexesOptions, CreateIndexesOutcome, FindOptions,
    Gateway, GatewayError, GatewayResult, InsertOutcome, UpdateOptions, UpdateOutcome,
    WriteFailure,
};
use crate::convert::{bson_as_u64, to_i64};

impl From<mongodb::error::Error> for GatewayError {
    fn from(err: mongodb::error::Error) -> Self {
        GatewayError(err.to_string())
    }
}

/// Gateway backed by a live MongoDB deployment.
pub struct MongoGateway {
    client: Client,
    db: Database,
}

impl MongoGateway {
    /// Connect to `uri` and select `database`, or the URI's default database.
    ///
    /// Read-only connections prefer secondaries. The connection is verified
    /// with a `ping` before returning.
    pub async fn connect(uri: &str, database: Option<&str>, read_only: bool) -> GatewayResult<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        if read_only {
            options.selection_criteria = Some(SelectionCriteria::ReadPreference(
                ReadPreference::Secondary {
                    options: Default::default(),
                },
            ));
        }
        let client = Client::with_options(options)?;

        let db = match database {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                GatewayError::new("connection string names no database; pass --database")
            })?,
        };

        db.run_command(doc! { "ping": 1 }).await?;
        tracing::info!(database = db.name(), read_only, "connected to MongoDB");

        Ok(Self { client, db })
    }

    /// Name of the selected database.
    pub fn database_name(&self) -> &str {
        self.db.name()
    }

    /// Close all pooled connections.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
        tracing::info!("MongoDB client shut down");
    }
}

#[async_trait]
impl Gateway for MongoGateway {
    fn collection(&self, name: &str) -> Box<dyn CollectionHandle> {
        Box::new(MongoCollection {
            name: name.to_string(),
            inner: self.db.collection::<Document>(name),
            db: self.db.clone(),
        })
    }

    async fn command(&self, command: Document) -> GatewayResult<Document> {
        Ok(self.db.run_command(command).await?)
    }

    async fn list_collections(
        &self,
        filter: Document,
        name_only: bool,
    ) -> GatewayResult<Vec<Document>> {
        let specs: Vec<_> = self
            .db
            .list_collections()
            .filter(filter)
            .await?
            .try_collect()
            .await?;

        specs
            .into_iter()
            .map(|spec| -> GatewayResult<Document> {
                let kind = match spec.collection_type {
                    CollectionType::View => "view",
                    CollectionType::Timeseries => "timeseries",
                    _ => "collection",
                };
                let mut entry = doc! { "name": spec.name, "type": kind };
                if !name_only {
                    entry.insert("options", bson::to_document(&spec.options)?);
                    entry.insert("info", doc! { "readOnly": spec.info.read_only });
                }
                Ok(entry)
            })
            .collect()
    }
}

struct MongoCollection {
    name: String,
    inner: Collection<Document>,
    db: Database,
}

#[async_trait]
impl CollectionHandle for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: Document, options: FindOptions) -> GatewayResult<Vec<Document>> {
        let mut find_options = mongodb::options::FindOptions::default();
        if options.limit > 0 {
            find_options.limit = Some(to_i64(options.limit));
        }
        find_options.skip = Some(options.skip);
        find_options.sort = options.sort;
        find_options.projection = options.projection;

        let cursor = self.inner.find(filter).with_options(find_options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_documents(
        &self,
        filter: Document,
        options: CountOptions,
    ) -> GatewayResult<u64> {
        // Same pipeline the driver's countDocuments helper builds, issued as
        // a raw command so every option passes through untouched.
        let mut pipeline = vec![doc! { "$match": filter }];
        if let Some(skip) = options.skip {
            pipeline.push(doc! { "$skip": to_i64(skip) });
        }
        if let Some(limit) = options.limit {
            pipeline.push(doc! { "$limit": to_i64(limit) });
        }
        pipeline.push(doc! { "$group": { "_id": 1, "n": { "$sum": 1 } } });

        let mut command = doc! {
            "aggregate": self.name.as_str(),
            "pipeline": pipeline,
            "cursor": {},
        };
        if let Some(hint) = options.hint {
            command.insert("hint", hint);
        }
        if let Some(read_concern) = options.read_concern {
            command.insert("readConcern", read_concern);
        }
        if let Some(max_time_ms) = options.max_time_ms {
            command.insert("maxTimeMS", to_i64(max_time_ms));
        }
        if let Some(collation) = options.collation {
            command.insert("collation", collation);
        }

        let reply = self.db.run_command(command).await?;
        let first = reply
            .get_document("cursor")
            .and_then(|c| c.get_array("firstBatch"))
            .map_err(|e| GatewayError::new(format!("malformed count reply: {}", e)))?
            .first()
            .and_then(Bson::as_document)
            .and_then(|d| bson_as_u64(d.get("n")));
        Ok(first.unwrap_or(0))
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> GatewayResult<Vec<Document>> {
        let cursor = self.inner.aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> GatewayResult<UpdateOutcome> {
        let mut update_options = mongodb::options::UpdateOptions::default();
        update_options.upsert = Some(options.upsert);

        let result = if options.multi {
            self.inner
                .update_many(filter, update)
                .with_options(update_options)
                .await?
        } else {
            self.inner
                .update_one(filter, update)
                .with_options(update_options)
                .await?
        };

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn insert_many(
        &self,
        mut documents: Vec<Document>,
        ordered: bool,
    ) -> GatewayResult<InsertOutcome> {
        // Ids are assigned here so they can be reported even though the raw
        // insert command does not echo them.
        let ids: Vec<Bson> = documents
            .iter_mut()
            .map(|doc| {
                doc.entry("_id".to_string())
                    .or_insert_with(|| Bson::ObjectId(ObjectId::new()))
                    .clone()
            })
            .collect();
        let submitted = documents.len();

        let reply = self
            .db
            .run_command(doc! {
                "insert": self.name.as_str(),
                "documents": documents,
                "ordered": ordered,
            })
            .await?;

        let mut write_errors = Vec::new();
        if let Ok(errors) = reply.get_array("writeErrors") {
            for error in errors.iter().filter_map(Bson::as_document) {
                write_errors.push(WriteFailure {
                    index: bson_as_u64(error.get("index")).unwrap_or(0) as usize,
                    code: error.get_i32("code").unwrap_or(0),
                    message: error.get_str("errmsg").unwrap_or_default().to_string(),
                });
            }
        }
        if let Ok(wce) = reply.get_document("writeConcernError") {
            return Err(GatewayError::new(format!(
                "write concern error: {}",
                wce.get_str("errmsg").unwrap_or("unknown")
            )));
        }

        // An ordered batch stops at the first failure.
        let attempted = if ordered {
            write_errors.first().map_or(submitted, |e| e.index)
        } else {
            submitted
        };
        let inserted_ids = ids
            .into_iter()
            .enumerate()
            .take(attempted)
            .filter(|(index, _)| !write_errors.iter().any(|e| e.index == *index))
            .collect();

        Ok(InsertOutcome {
            inserted_ids,
            write_errors,
        })
    }

    async fn create_indexes(
        &self,
        indexes: Vec<Document>,
        options: CreateIndexesOptions,
    ) -> GatewayResult<CreateIndexesOutcome> {
        let created_indexes = indexes
            .iter()
            .filter_map(|spec| spec.get_str("name").ok().map(str::to_string))
            .collect();

        let mut command = doc! {
            "createIndexes": self.name.as_str(),
            "indexes": indexes,
        };
        if let Some(write_concern) = options.write_concern {
            command.insert("writeConcern", write_concern);
        }
        if let Some(commit_quorum) = options.commit_quorum {
            command.insert("commitQuorum", commit_quorum);
        }

        let reply = self.db.run_command(command).await?;
        Ok(CreateIndexesOutcome {
            created_indexes,
            num_indexes_before: bson_as_u64(reply.get("numIndexesBefore")).unwrap_or(0),
            num_indexes_after: bson_as_u64(reply.get("numIndexesAfter")).unwrap_or(0),
        })
    }
}
