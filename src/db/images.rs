//! Image listing, detail fetch and the few allowed mutations.

use rusqlite::types::Value;
use serde::Serialize;
use std::collections::BTreeSet;

use super::filter::{ImageFilter, ListQuery};
use super::{iso8601, text_value, Database, DbResult};

/// One row of a paginated image listing. `file_path` is already resolved:
/// a platform-specific override wins over the stored path.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRow {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
    pub score_general: Option<f64>,
    pub rating: i64,
    pub label: Option<String>,
    pub created_at: String,
    pub thumbnail_path: Option<String>,
}

/// Full record of one image, normalized to portable values so it can cross
/// a serialization boundary: free-text columns decoded whether stored as
/// TEXT or BLOB, timestamps reformatted to ISO-8601, no driver types.
#[derive(Debug, Clone, Serialize)]
pub struct ImageDetail {
    pub id: i64,
    pub job_id: Option<i64>,
    pub file_path: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub score: Option<f64>,
    pub score_general: Option<f64>,
    pub score_technical: Option<f64>,
    pub score_aesthetic: Option<f64>,
    pub score_spaq: Option<f64>,
    pub score_ava: Option<f64>,
    pub score_koniq: Option<f64>,
    pub score_paq2piq: Option<f64>,
    pub score_liqe: Option<f64>,
    pub keywords: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<String>,
    pub thumbnail_path: Option<String>,
    pub scores_json: Option<String>,
    pub model_version: Option<String>,
    pub rating: i64,
    pub label: Option<String>,
    pub image_hash: Option<String>,
    pub folder_id: Option<i64>,
    pub stack_id: Option<i64>,
    pub created_at: String,
    pub burst_uuid: Option<String>,
    pub win_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: i64,
    pub path: String,
    pub parent_id: Option<i64>,
    pub is_fully_scored: bool,
}

/// The only image fields a caller may change. Anything else in an update
/// payload is ignored, not rejected.
const UPDATABLE_FIELDS: [&str; 4] = ["title", "description", "rating", "label"];

fn json_to_sql(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

impl Database {
    /// Total images matching the filter, ignoring pagination and sort.
    pub async fn count_images(&self, filter: &ImageFilter) -> DbResult<i64> {
        let (clause, params) = filter.where_clause("images");
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM images {}", clause),
                rusqlite::params_from_iter(params),
                |row| row.get(0),
            )
        })
        .await
    }

    /// One page of images, sorted and filtered, with resolved display paths.
    pub async fn list_images(&self, query: &ListQuery) -> DbResult<Vec<ImageRow>> {
        let mut params: Vec<Value> = vec![Value::Text(self.path_type().to_string())];
        let (clause, filter_params) = query.filter.where_clause("i");
        params.extend(filter_params);
        params.push(Value::Integer(query.limit as i64));
        params.push(Value::Integer(query.offset as i64));

        let sql = format!(
            r#"
            SELECT i.id, COALESCE(fp.path, i.file_path) AS file_path, i.file_name,
                   i.score_general, i.rating, i.label, i.created_at, i.thumbnail_path
            FROM images i
            LEFT JOIN file_paths fp ON fp.image_id = i.id AND fp.path_type = ?
            {}
            ORDER BY i.{} {}
            LIMIT ? OFFSET ?
            "#,
            clause,
            query.sort_by.column(),
            query.order.as_sql(),
        );

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    Ok(ImageRow {
                        id: row.get(0)?,
                        file_path: row.get(1)?,
                        file_name: row.get(2)?,
                        score_general: row.get(3)?,
                        rating: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                        label: row.get(5)?,
                        created_at: iso8601(&row.get::<_, String>(6)?),
                        thumbnail_path: row.get(7)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
        .await
    }

    /// All distinct keywords across the library, ascending. The stored
    /// field is a comma-separated list; entries are trimmed and deduped.
    pub async fn list_keywords(&self) -> DbResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT keywords FROM images WHERE keywords IS NOT NULL AND keywords <> ''",
            )?;
            let values = stmt
                .query_map([], |row| row.get::<_, Value>(0))?
                .filter_map(|r| r.ok());

            let mut unique = BTreeSet::new();
            for value in values {
                if let Some(text) = text_value(value) {
                    for part in text.split(',') {
                        let part = part.trim();
                        if !part.is_empty() {
                            unique.insert(part.to_string());
                        }
                    }
                }
            }
            Ok(unique.into_iter().collect())
        })
        .await
    }

    pub async fn list_folders(&self) -> DbResult<Vec<Folder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, path, parent_id, is_fully_scored FROM folders ORDER BY path ASC",
            )?;
            let folders = stmt
                .query_map([], |row| {
                    Ok(Folder {
                        id: row.get(0)?,
                        path: row.get(1)?,
                        parent_id: row.get(2)?,
                        is_fully_scored: row.get::<_, Option<i64>>(3)?.unwrap_or(0) != 0,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(folders)
        })
        .await
    }

    /// Every stored attribute of one image, or None when the id is unknown.
    pub async fn get_image_details(&self, id: i64) -> DbResult<Option<ImageDetail>> {
        let path_type = self.path_type().to_string();
        let result = self
            .with_conn(move |conn| {
                conn.query_row(
                    r#"
                    SELECT i.id, i.job_id, i.file_path, i.file_name, i.file_type,
                           i.score, i.score_general, i.score_technical, i.score_aesthetic,
                           i.score_spaq, i.score_ava, i.score_koniq, i.score_paq2piq, i.score_liqe,
                           i.keywords, i.title, i.description, i.metadata,
                           i.thumbnail_path, i.scores_json, i.model_version,
                           i.rating, i.label, i.image_hash,
                           i.folder_id, i.stack_id, i.created_at, i.burst_uuid,
                           fp.path AS win_path
                    FROM images i
                    LEFT JOIN file_paths fp ON fp.image_id = i.id AND fp.path_type = ?
                    WHERE i.id = ?
                    "#,
                    rusqlite::params![path_type, id],
                    |row| {
                        Ok(ImageDetail {
                            id: row.get(0)?,
                            job_id: row.get(1)?,
                            file_path: row.get(2)?,
                            file_name: row.get(3)?,
                            file_type: row.get(4)?,
                            score: row.get(5)?,
                            score_general: row.get(6)?,
                            score_technical: row.get(7)?,
                            score_aesthetic: row.get(8)?,
                            score_spaq: row.get(9)?,
                            score_ava: row.get(10)?,
                            score_koniq: row.get(11)?,
                            score_paq2piq: row.get(12)?,
                            score_liqe: row.get(13)?,
                            keywords: text_value(row.get(14)?),
                            title: text_value(row.get(15)?),
                            description: text_value(row.get(16)?),
                            metadata: text_value(row.get(17)?),
                            thumbnail_path: row.get(18)?,
                            scores_json: text_value(row.get(19)?),
                            model_version: row.get(20)?,
                            rating: row.get::<_, Option<i64>>(21)?.unwrap_or(0),
                            label: row.get(22)?,
                            image_hash: row.get(23)?,
                            folder_id: row.get(24)?,
                            stack_id: row.get(25)?,
                            created_at: iso8601(&row.get::<_, String>(26)?),
                            burst_uuid: row.get(27)?,
                            win_path: row.get(28)?,
                        })
                    },
                )
            })
            .await;

        match result {
            Ok(detail) => Ok(Some(detail)),
            Err(super::DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Apply the recognized fields of an update payload. Unknown fields are
    /// ignored; a payload with no recognized field is a no-op returning
    /// false.
    pub async fn update_image_details(
        &self,
        id: i64,
        updates: &serde_json::Value,
    ) -> DbResult<bool> {
        let mut set_parts: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(map) = updates.as_object() {
            for field in UPDATABLE_FIELDS {
                if let Some(value) = map.get(field) {
                    set_parts.push(format!("{} = ?", field));
                    params.push(json_to_sql(value));
                }
            }
        }

        if set_parts.is_empty() {
            return Ok(false);
        }

        params.push(Value::Integer(id));
        let sql = format!("UPDATE images SET {} WHERE id = ?", set_parts.join(", "));
        self.with_conn(move |conn| conn.execute(&sql, rusqlite::params_from_iter(params)))
            .await?;
        Ok(true)
    }

    /// Delete the database row only. The file on disk is never touched
    /// from here.
    pub async fn delete_image(&self, id: i64) -> DbResult<usize> {
        self.with_conn(move |conn| conn.execute("DELETE FROM images WHERE id = ?", [id]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::ImageFilter;
    use super::super::{ListQuery, SortColumn, SortOrder};
    use serde_json::json;

    async fn seeded() -> (tempfile::TempDir, super::Database) {
        let (dir, db) = empty_db().await;
        insert_folder(&db, 1, "/photos/2024", None).await;
        insert_folder(&db, 2, "/photos/2024/trip", Some(1)).await;
        // rating spread including 0, two labels, keywords on some rows
        insert_image(&db, 1, "a.nef", Some(0.9), 5, Some("Green"), Some("lake, sunset"), Some(1), None, "2024-01-01 10:00:00").await;
        insert_image(&db, 2, "b.nef", Some(0.5), 0, None, Some("sunset , beach"), Some(1), None, "2024-01-02 10:00:00").await;
        insert_image(&db, 3, "c.nef", Some(0.7), 3, Some("Red"), None, Some(2), None, "2024-01-03 10:00:00").await;
        insert_image(&db, 4, "d.nef", None, 2, None, Some("lake"), None, None, "2024-01-04 10:00:00").await;
        (dir, db)
    }

    #[tokio::test]
    async fn count_matches_unpaginated_listing_for_any_filter() {
        let (_dir, db) = seeded().await;
        let filters = [
            ImageFilter::default(),
            ImageFilter { folder_id: Some(1), ..Default::default() },
            ImageFilter { min_rating: Some(3), ..Default::default() },
            ImageFilter { keyword: Some("lake".into()), ..Default::default() },
        ];
        for filter in filters {
            let count = db.count_images(&filter).await.unwrap();
            let rows = db
                .list_images(&ListQuery {
                    filter: filter.clone(),
                    limit: u32::MAX,
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(count as usize, rows.len(), "filter: {:?}", filter);
        }
    }

    #[tokio::test]
    async fn min_rating_zero_returns_unrated_and_top_rated_alike() {
        let (_dir, db) = seeded().await;
        let unfiltered = db
            .count_images(&ImageFilter { min_rating: Some(0), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(unfiltered, 4);

        let rated = db
            .count_images(&ImageFilter { min_rating: Some(3), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(rated, 2); // ids 1 and 3
    }

    #[tokio::test]
    async fn keyword_filter_is_a_case_sensitive_substring_match() {
        let (_dir, db) = seeded().await;
        let lower = db
            .count_images(&ImageFilter { keyword: Some("lake".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(lower, 2); // ids 1 and 4

        let upper = db
            .count_images(&ImageFilter { keyword: Some("Lake".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(upper, 0);
    }

    #[tokio::test]
    async fn listing_sorts_and_paginates() {
        let (_dir, db) = seeded().await;
        let rows = db
            .list_images(&ListQuery {
                sort_by: SortColumn::ScoreGeneral,
                order: SortOrder::Desc,
                limit: 2,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        // full ordering by score desc: 1 (0.9), 3 (0.7), 2 (0.5), 4 (null)
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[tokio::test]
    async fn display_path_prefers_platform_override() {
        let (_dir, db) = seeded().await;
        insert_path_override(&db, 1, "WIN", "Z:\\photos\\a.nef").await;
        insert_path_override(&db, 2, "MAC", "/Volumes/photos/b.nef").await;

        let rows = db.list_images(&ListQuery::default()).await.unwrap();
        let by_id = |id: i64| rows.iter().find(|r| r.id == id).unwrap();
        assert_eq!(by_id(1).file_path, "Z:\\photos\\a.nef");
        // a MAC override must not leak into the WIN-tagged resolution
        assert_eq!(by_id(2).file_path, "/photos/b.nef");
    }

    #[tokio::test]
    async fn keywords_are_split_trimmed_deduped_and_sorted() {
        let (_dir, db) = seeded().await;
        let keywords = db.list_keywords().await.unwrap();
        assert_eq!(keywords, vec!["beach", "lake", "sunset"]);
    }

    #[tokio::test]
    async fn folders_come_back_in_path_order() {
        let (_dir, db) = seeded().await;
        let folders = db.list_folders().await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].path, "/photos/2024");
        assert_eq!(folders[1].parent_id, Some(1));
        assert!(folders[0].is_fully_scored);
    }

    #[tokio::test]
    async fn details_normalize_timestamps_and_resolve_win_path() {
        let (_dir, db) = seeded().await;
        insert_path_override(&db, 1, "WIN", "Z:\\photos\\a.nef").await;

        let detail = db.get_image_details(1).await.unwrap().unwrap();
        assert_eq!(detail.id, 1);
        assert_eq!(detail.created_at, "2024-01-01T10:00:00+00:00");
        assert_eq!(detail.win_path.as_deref(), Some("Z:\\photos\\a.nef"));
        assert_eq!(detail.keywords.as_deref(), Some("lake, sunset"));
    }

    #[tokio::test]
    async fn missing_detail_is_absent_not_an_error() {
        let (_dir, db) = seeded().await;
        assert!(db.get_image_details(999_999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_applies_allowed_fields_and_ignores_the_rest() {
        let (_dir, db) = seeded().await;
        let changed = db
            .update_image_details(2, &json!({"rating": 5, "bogusField": "x"}))
            .await
            .unwrap();
        assert!(changed);

        let detail = db.get_image_details(2).await.unwrap().unwrap();
        assert_eq!(detail.rating, 5);

        // payload with no recognized field is a no-op, not an error
        let changed = db
            .update_image_details(2, &json!({"file_path": "/elsewhere"}))
            .await
            .unwrap();
        assert!(!changed);
        let detail = db.get_image_details(2).await.unwrap().unwrap();
        assert_eq!(detail.file_path, "/photos/b.nef");
    }

    #[tokio::test]
    async fn delete_removes_only_the_row() {
        let (_dir, db) = seeded().await;
        let deleted = db.delete_image(3).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_image_details(3).await.unwrap().is_none());
        assert_eq!(db.count_images(&ImageFilter::default()).await.unwrap(), 3);
    }
}
