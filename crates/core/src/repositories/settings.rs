//! Runtime settings stored as JSON documents in the `settings` table.

use crate::constants::SETTINGS_KEY_TRIAGE_CATEGORIES;
use crate::db::{fmt_datetime, now, Database};
use crate::models::TriageCategory;
use crate::{HmsError, HmsResult};
use api_shared::dto::{TriageCategorySetting, TriageCategorySettingsDto};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

const MAX_TARGET_MINUTES: u32 = 24 * 60;

/// Typed access to the `settings` table.
#[derive(Clone, Debug)]
pub struct SettingsRepository {
    db: Database,
}

impl SettingsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> HmsResult<Option<T>> {
        let raw: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(HmsError::from)
        })?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(HmsError::Deserialization))
            .transpose()
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> HmsResult<()> {
        let raw = serde_json::to_string(value).map_err(HmsError::Serialization)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, raw, fmt_datetime(&now())],
            )?;
            Ok(())
        })
    }

    /// Triage category presentation, falling back to the built-in defaults.
    pub fn triage_categories(&self) -> HmsResult<TriageCategorySettingsDto> {
        Ok(self
            .get(SETTINGS_KEY_TRIAGE_CATEGORIES)?
            .unwrap_or_else(default_triage_categories))
    }

    pub fn set_triage_categories(
        &self,
        settings: &TriageCategorySettingsDto,
    ) -> HmsResult<TriageCategorySettingsDto> {
        let normalised = validate_triage_categories(settings)?;
        self.put(SETTINGS_KEY_TRIAGE_CATEGORIES, &normalised)?;
        tracing::info!("triage category settings updated");
        Ok(normalised)
    }
}

pub fn default_triage_categories() -> TriageCategorySettingsDto {
    let entry = |category: TriageCategory, label: &str, colour: &str, target_minutes: u32| {
        TriageCategorySetting {
            category: category.to_string(),
            label: label.into(),
            colour: colour.into(),
            target_minutes,
        }
    };
    TriageCategorySettingsDto {
        categories: vec![
            entry(TriageCategory::Red, "Immediate", "#DC2626", 0),
            entry(TriageCategory::Yellow, "Urgent", "#EAB308", 30),
            entry(TriageCategory::Green, "Non-urgent", "#16A34A", 120),
            entry(TriageCategory::Black, "Expectant", "#111827", 0),
        ],
    }
}

fn is_hex_colour(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Every category exactly once, in severity order, with a label and a `#RRGGBB` colour.
fn validate_triage_categories(
    settings: &TriageCategorySettingsDto,
) -> HmsResult<TriageCategorySettingsDto> {
    let mut seen = Vec::with_capacity(settings.categories.len());
    for entry in &settings.categories {
        let category = TriageCategory::parse_field("category", &entry.category)?;
        if seen.iter().any(|(c, _)| *c == category) {
            return Err(HmsError::validation(
                "categories",
                format!("{category} is listed more than once"),
            ));
        }
        let label = entry.label.trim();
        if label.is_empty() {
            return Err(HmsError::validation("label", format!("{category} needs a label")));
        }
        let colour = entry.colour.trim();
        if !is_hex_colour(colour) {
            return Err(HmsError::validation("colour", "expected #RRGGBB"));
        }
        if entry.target_minutes > MAX_TARGET_MINUTES {
            return Err(HmsError::validation(
                "target_minutes",
                format!("cannot exceed {MAX_TARGET_MINUTES}"),
            ));
        }
        seen.push((
            category,
            TriageCategorySetting {
                category: category.to_string(),
                label: label.to_string(),
                colour: colour.to_uppercase(),
                target_minutes: entry.target_minutes,
            },
        ));
    }
    if seen.len() != TriageCategory::ALL.len() {
        return Err(HmsError::validation(
            "categories",
            "every triage category must be configured",
        ));
    }
    seen.sort_by_key(|(c, _)| c.severity_rank());
    Ok(TriageCategorySettingsDto {
        categories: seen.into_iter().map(|(_, s)| s).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SettingsRepository {
        SettingsRepository::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn defaults_cover_every_category() {
        let defaults = repo().triage_categories().unwrap();
        assert_eq!(defaults.categories.len(), TriageCategory::ALL.len());
        assert_eq!(defaults.categories[0].category, "red");
    }

    #[test]
    fn put_then_get_is_typed() {
        let repo = repo();
        repo.put("ui.page_size", &25u32).unwrap();
        assert_eq!(repo.get::<u32>("ui.page_size").unwrap(), Some(25));
        assert_eq!(repo.get::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn triage_settings_are_normalised_and_persisted() {
        let repo = repo();
        let mut settings = default_triage_categories();
        settings.categories.reverse();
        settings.categories[0].colour = "#abcdef".into();
        settings.categories[0].target_minutes = 5;

        let saved = repo.set_triage_categories(&settings).unwrap();
        assert_eq!(saved.categories[0].category, "red");
        let black = saved.categories.iter().find(|c| c.category == "black").unwrap();
        assert_eq!(black.colour, "#ABCDEF");
        assert_eq!(repo.triage_categories().unwrap(), saved);
    }

    #[test]
    fn incomplete_or_invalid_settings_are_rejected() {
        let repo = repo();
        let mut missing = default_triage_categories();
        missing.categories.pop();
        assert_eq!(
            repo.set_triage_categories(&missing).unwrap_err().field(),
            Some("categories")
        );

        let mut bad_colour = default_triage_categories();
        bad_colour.categories[1].colour = "yellow".into();
        assert_eq!(
            repo.set_triage_categories(&bad_colour).unwrap_err().field(),
            Some("colour")
        );

        let mut duplicate = default_triage_categories();
        duplicate.categories[3].category = "red".into();
        assert_eq!(
            repo.set_triage_categories(&duplicate).unwrap_err().field(),
            Some("categories")
        );
    }
}
