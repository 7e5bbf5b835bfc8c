//! Payloads carried by inline keyboard buttons.
//!
//! A payload is encoded as `key:value` fields joined by `|`, with the variant
//! name in the reserved `type` field, e.g. `type:FilterChapter|chapter_id:12`.
//! List values join their items with `#`.

use std::collections::HashMap;
use std::sync::LazyLock;

const FIELDS_SEP: char = '|';
const PAIR_SEP: char = ':';
const VALUES_SEP: char = '#';
const TAG_FIELD: &str = "type";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Malformed field \"{field}\"")]
    MalformedField { field: String },

    #[error("Missing field \"{field}\"")]
    MissingField { field: String },

    #[error("Invalid value \"{value}\" for field \"{field}\"")]
    InvalidValue { field: String, value: String },

    #[error("Unknown callback type \"{tag}\"")]
    UnknownType { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPayload {
    Menu,
    Back,
    Nothing,
    Settings,
    Language { lang: String },
    ProjectsPage { page: i64 },
    FilterActive,
    FilterSafeDeal,
    FilterWithoutExecutor,
    FilterBudgetMin,
    FilterBudgetMax,
    FilterChapters,
    FilterChapter { chapter_id: i64 },
    FilterChapterSelectAll { chapter_id: i64 },
    FilterChapterSelect { chapter_ids: Vec<i64> },
    FilterChapterReset { chapter_id: i64 },
}

type Decoder = fn(&Fields) -> Result<CallbackPayload, CallbackError>;

static DECODERS: LazyLock<HashMap<&'static str, Decoder>> = LazyLock::new(|| {
    let mut map: HashMap<&'static str, Decoder> = HashMap::new();
    map.insert("Menu", |_| Ok(CallbackPayload::Menu));
    map.insert("Back", |_| Ok(CallbackPayload::Back));
    map.insert("Nothing", |_| Ok(CallbackPayload::Nothing));
    map.insert("Settings", |_| Ok(CallbackPayload::Settings));
    map.insert("Language", |f| {
        Ok(CallbackPayload::Language {
            lang: f.text("lang")?.to_string(),
        })
    });
    map.insert("ProjectsPage", |f| {
        Ok(CallbackPayload::ProjectsPage { page: f.int("page")? })
    });
    map.insert("FilterActive", |_| Ok(CallbackPayload::FilterActive));
    map.insert("FilterSafeDeal", |_| Ok(CallbackPayload::FilterSafeDeal));
    map.insert("FilterWithoutExecutor", |_| {
        Ok(CallbackPayload::FilterWithoutExecutor)
    });
    map.insert("FilterBudgetMin", |_| Ok(CallbackPayload::FilterBudgetMin));
    map.insert("FilterBudgetMax", |_| Ok(CallbackPayload::FilterBudgetMax));
    map.insert("FilterChapters", |_| Ok(CallbackPayload::FilterChapters));
    map.insert("FilterChapter", |f| {
        Ok(CallbackPayload::FilterChapter {
            chapter_id: f.int("chapter_id")?,
        })
    });
    map.insert("FilterChapterSelectAll", |f| {
        Ok(CallbackPayload::FilterChapterSelectAll {
            chapter_id: f.int("chapter_id")?,
        })
    });
    map.insert("FilterChapterSelect", |f| {
        Ok(CallbackPayload::FilterChapterSelect {
            chapter_ids: f.int_list("chapter_ids")?,
        })
    });
    map.insert("FilterChapterReset", |f| {
        Ok(CallbackPayload::FilterChapterReset {
            chapter_id: f.int("chapter_id")?,
        })
    });
    map
});

impl CallbackPayload {
    /// Name carried in the `type` field.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Menu => "Menu",
            Self::Back => "Back",
            Self::Nothing => "Nothing",
            Self::Settings => "Settings",
            Self::Language { .. } => "Language",
            Self::ProjectsPage { .. } => "ProjectsPage",
            Self::FilterActive => "FilterActive",
            Self::FilterSafeDeal => "FilterSafeDeal",
            Self::FilterWithoutExecutor => "FilterWithoutExecutor",
            Self::FilterBudgetMin => "FilterBudgetMin",
            Self::FilterBudgetMax => "FilterBudgetMax",
            Self::FilterChapters => "FilterChapters",
            Self::FilterChapter { .. } => "FilterChapter",
            Self::FilterChapterSelectAll { .. } => "FilterChapterSelectAll",
            Self::FilterChapterSelect { .. } => "FilterChapterSelect",
            Self::FilterChapterReset { .. } => "FilterChapterReset",
        }
    }

    pub fn encode(&self) -> String {
        let mut fields = vec![(TAG_FIELD, self.tag().to_string())];
        match self {
            Self::Language { lang } => fields.push(("lang", lang.clone())),
            Self::ProjectsPage { page } => fields.push(("page", page.to_string())),
            Self::FilterChapter { chapter_id }
            | Self::FilterChapterSelectAll { chapter_id }
            | Self::FilterChapterReset { chapter_id } => {
                fields.push(("chapter_id", chapter_id.to_string()))
            }
            Self::FilterChapterSelect { chapter_ids } => fields.push((
                "chapter_ids",
                chapter_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(&VALUES_SEP.to_string()),
            )),
            _ => {}
        }

        fields
            .into_iter()
            .map(|(key, value)| format!("{key}{PAIR_SEP}{value}"))
            .collect::<Vec<_>>()
            .join(&FIELDS_SEP.to_string())
    }

    pub fn decode(data: &str) -> Result<Self, CallbackError> {
        let fields = Fields::parse(data)?;
        let tag = fields.text(TAG_FIELD)?;
        let decoder = DECODERS
            .get(tag)
            .ok_or_else(|| CallbackError::UnknownType {
                tag: tag.to_string(),
            })?;
        decoder(&fields)
    }
}

struct Fields<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> Fields<'a> {
    fn parse(data: &'a str) -> Result<Self, CallbackError> {
        let mut values = HashMap::new();
        for field in data.split(FIELDS_SEP) {
            let (key, value) =
                field
                    .split_once(PAIR_SEP)
                    .ok_or_else(|| CallbackError::MalformedField {
                        field: field.to_string(),
                    })?;
            if key.is_empty() || value.contains(PAIR_SEP) {
                return Err(CallbackError::MalformedField {
                    field: field.to_string(),
                });
            }
            values.insert(key, value);
        }
        Ok(Self { values })
    }

    fn text(&self, field: &str) -> Result<&'a str, CallbackError> {
        self.values
            .get(field)
            .copied()
            .ok_or_else(|| CallbackError::MissingField {
                field: field.to_string(),
            })
    }

    fn int(&self, field: &str) -> Result<i64, CallbackError> {
        let value = self.text(field)?;
        parse_int(field, value)
    }

    fn int_list(&self, field: &str) -> Result<Vec<i64>, CallbackError> {
        let value = self.text(field)?;
        if value.is_empty() {
            return Ok(Vec::new());
        }
        value
            .split(VALUES_SEP)
            .map(|item| parse_int(field, item))
            .collect()
    }
}

fn parse_int(field: &str, value: &str) -> Result<i64, CallbackError> {
    value.parse().map_err(|_| CallbackError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}
