//! Filter and sort specifications shared by every listing operation.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// Color label assigned by the user, stored as text in the images table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorLabel {
    Red,
    Yellow,
    Green,
    Blue,
    Purple,
}

impl ColorLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorLabel::Red => "Red",
            ColorLabel::Yellow => "Yellow",
            ColorLabel::Green => "Green",
            ColorLabel::Blue => "Blue",
            ColorLabel::Purple => "Purple",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Red" => Some(ColorLabel::Red),
            "Yellow" => Some(ColorLabel::Yellow),
            "Green" => Some(ColorLabel::Green),
            "Blue" => Some(ColorLabel::Blue),
            "Purple" => Some(ColorLabel::Purple),
            _ => None,
        }
    }
}

/// Filter applied to image listings. Absent fields contribute no predicate.
///
/// `min_rating` of 0 (or None) means "no rating filter", not "rating >= 0";
/// every listing operation depends on that sentinel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageFilter {
    pub folder_id: Option<i64>,
    pub min_rating: Option<i64>,
    pub color_label: Option<ColorLabel>,
    pub keyword: Option<String>,
}

impl ImageFilter {
    /// Build the predicate text over the given table alias, plus the bound
    /// values in the order their placeholders appear. Fields combine with
    /// AND; an empty filter yields an empty predicate.
    pub fn predicate(&self, alias: &str) -> (String, Vec<Value>) {
        let mut parts: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(folder_id) = self.folder_id {
            parts.push(format!("{}.folder_id = ?", alias));
            params.push(Value::Integer(folder_id));
        }

        if let Some(min_rating) = self.min_rating {
            if min_rating > 0 {
                parts.push(format!("{}.rating >= ?", alias));
                params.push(Value::Integer(min_rating));
            }
        }

        if let Some(label) = self.color_label {
            parts.push(format!("{}.label = ?", alias));
            params.push(Value::Text(label.as_str().to_string()));
        }

        if let Some(keyword) = &self.keyword {
            if !keyword.is_empty() {
                parts.push(format!("{}.keywords LIKE ?", alias));
                params.push(Value::Text(format!("%{}%", keyword)));
            }
        }

        (parts.join(" AND "), params)
    }

    /// Same as [`predicate`](Self::predicate) but prefixed with `WHERE`
    /// when any field is set.
    pub fn where_clause(&self, alias: &str) -> (String, Vec<Value>) {
        let (predicate, params) = self.predicate(alias);
        if predicate.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", predicate), params)
        }
    }
}

/// Columns a caller may sort a listing by.
///
/// Caller input is never interpolated into SQL directly; it is parsed into
/// this enum and the enum maps to a fixed column reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    CreatedAt,
    ScoreGeneral,
    ScoreTechnical,
    ScoreAesthetic,
    ScoreSpaq,
    ScoreAva,
    ScoreKoniq,
    ScorePaq2piq,
    ScoreLiqe,
    Rating,
    FileName,
}

impl SortColumn {
    /// Parse caller-supplied input. Unrecognized values fall back to the
    /// general score instead of erroring, so unvalidated UI input can never
    /// break a listing.
    pub fn parse(s: &str) -> Self {
        Self::from_str(s).unwrap_or(SortColumn::ScoreGeneral)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "id" => Some(SortColumn::Id),
            "created_at" => Some(SortColumn::CreatedAt),
            "score_general" => Some(SortColumn::ScoreGeneral),
            "score_technical" => Some(SortColumn::ScoreTechnical),
            "score_aesthetic" => Some(SortColumn::ScoreAesthetic),
            "score_spaq" => Some(SortColumn::ScoreSpaq),
            "score_ava" => Some(SortColumn::ScoreAva),
            "score_koniq" => Some(SortColumn::ScoreKoniq),
            "score_paq2piq" => Some(SortColumn::ScorePaq2piq),
            "score_liqe" => Some(SortColumn::ScoreLiqe),
            "rating" => Some(SortColumn::Rating),
            "file_name" => Some(SortColumn::FileName),
            _ => None,
        }
    }

    /// Column name in the images table.
    pub fn column(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::CreatedAt => "created_at",
            SortColumn::ScoreGeneral => "score_general",
            SortColumn::ScoreTechnical => "score_technical",
            SortColumn::ScoreAesthetic => "score_aesthetic",
            SortColumn::ScoreSpaq => "score_spaq",
            SortColumn::ScoreAva => "score_ava",
            SortColumn::ScoreKoniq => "score_koniq",
            SortColumn::ScorePaq2piq => "score_paq2piq",
            SortColumn::ScoreLiqe => "score_liqe",
            SortColumn::Rating => "rating",
            SortColumn::FileName => "file_name",
        }
    }

    /// Expression used to sort cache-backed stack rows. Aggregated columns
    /// use the min variant for ASC and the max variant for DESC, so a stack
    /// ranks by its best member when sorting descending. Columns with no
    /// cached aggregate fall back to the stack key or the representative
    /// image's column.
    pub fn cache_expr(&self, order: SortOrder) -> String {
        match self {
            SortColumn::Id => "sc.stack_id".to_string(),
            SortColumn::FileName => "i.file_name".to_string(),
            _ => {
                let agg = match order {
                    SortOrder::Asc => "min",
                    SortOrder::Desc => "max",
                };
                format!("sc.{}_{}", agg, self.column())
            }
        }
    }

    /// FileName is the only column compared as text; everything else sorts
    /// on a numeric key.
    pub fn is_textual(&self) -> bool {
        matches!(self, SortColumn::FileName)
    }
}

/// Sort direction; anything that is not the literal `ASC` is coerced to
/// descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self {
        if s == "ASC" {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Listing request: filter plus sort plus an offset-based page window.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filter: ImageFilter,
    pub sort_by: SortColumn,
    pub order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: ImageFilter::default(),
            sort_by: SortColumn::ScoreGeneral,
            order: SortOrder::Desc,
            limit: 50,
            offset: 0,
        }
    }
}
