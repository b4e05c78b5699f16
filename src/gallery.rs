//! The operation surface consumed by the UI boundary.
//!
//! Failure policy: listing operations degrade to an empty page so the UI
//! always has something renderable, mutations report a plain bool, and the
//! detail fetch propagates its error so the caller can tell "no data" from
//! "fetch failed". Counts and the cache rebuild also propagate.

use tracing::error;

use crate::config::Config;
use crate::db::{
    Database, DbResult, Folder, ImageDetail, ImageFilter, ImageRow, ListQuery, StackCacheManager,
    StackItem,
};

pub struct Gallery {
    db: Database,
    cache: StackCacheManager,
}

impl Gallery {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: StackCacheManager::new(),
        }
    }

    pub fn open(config: &Config) -> Self {
        Self::new(Database::with_path_type(
            &config.db_path,
            &config.gallery.path_type,
        ))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn get_image_count(&self, filter: &ImageFilter) -> DbResult<i64> {
        self.db.count_images(filter).await
    }

    pub async fn get_images(&self, query: &ListQuery) -> Vec<ImageRow> {
        match self.db.list_images(query).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("image listing failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_image_details(&self, id: i64) -> DbResult<Option<ImageDetail>> {
        self.db.get_image_details(id).await
    }

    pub async fn update_image_details(&self, id: i64, updates: &serde_json::Value) -> bool {
        match self.db.update_image_details(id, updates).await {
            Ok(changed) => changed,
            Err(e) => {
                error!("image update failed: {}", e);
                false
            }
        }
    }

    pub async fn delete_image(&self, id: i64) -> bool {
        match self.db.delete_image(id).await {
            Ok(_) => true,
            Err(e) => {
                error!("image delete failed: {}", e);
                false
            }
        }
    }

    pub async fn get_folders(&self) -> Vec<Folder> {
        match self.db.list_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                error!("folder listing failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_keywords(&self) -> Vec<String> {
        match self.db.list_keywords().await {
            Ok(keywords) => keywords,
            Err(e) => {
                error!("keyword listing failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_stacks(&self, query: &ListQuery) -> Vec<StackItem> {
        match self.db.list_stacks(&self.cache, query).await {
            Ok(items) => items,
            Err(e) => {
                error!("stack listing failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_images_by_stack(
        &self,
        stack_id: Option<i64>,
        query: &ListQuery,
    ) -> Vec<ImageRow> {
        match self.db.list_images_by_stack(stack_id, query).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("stack member listing failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_stack_count(&self, filter: &ImageFilter) -> DbResult<i64> {
        self.db.count_stacks(filter).await
    }

    pub async fn rebuild_stack_cache(&self) -> DbResult<usize> {
        self.cache.rebuild(&self.db).await
    }
}
