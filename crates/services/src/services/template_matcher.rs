//! Decides whether a task template applies to a home component.

use db::models::{home_component::HomeComponent, task_template::TaskTemplate};

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateMatcher;

impl TemplateMatcher {
    /// Category must agree. Non-empty brand and keyword lists each narrow the
    /// match further; blank entries in either list are ignored.
    pub fn matches(&self, template: &TaskTemplate, component: &HomeComponent) -> bool {
        if template.category != component.category {
            return false;
        }

        let brands = non_blank_lowercase(&template.match_brands);
        if !brands.is_empty() {
            let brand = component.brand.to_lowercase();
            if !brands.iter().any(|b| brand.contains(b.as_str())) {
                return false;
            }
        }

        let keywords = non_blank_lowercase(&template.match_keywords);
        if !keywords.is_empty() {
            let name = component.name.to_lowercase();
            let text = format!(
                "{} {} {} {}",
                component.name, component.brand, component.model, component.notes
            )
            .to_lowercase();
            // A hit on the name alone also counts.
            if !keywords
                .iter()
                .any(|k| text.contains(k.as_str()) || name.contains(k.as_str()))
            {
                return false;
            }
        }

        true
    }

    /// Templates from `templates` that apply to `component`, in the given order.
    pub fn matching<'t>(
        &self,
        templates: &'t [TaskTemplate],
        component: &HomeComponent,
    ) -> Vec<&'t TaskTemplate> {
        templates
            .iter()
            .filter(|template| self.matches(template, component))
            .collect()
    }
}

fn non_blank_lowercase(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::home_component::ComponentCategory;
    use sqlx::types::Json;
    use uuid::Uuid;

    use super::*;

    fn template(category: ComponentCategory, brands: &[&str], keywords: &[&str]) -> TaskTemplate {
        TaskTemplate {
            id: Uuid::new_v4(),
            title: "Service it".to_string(),
            description: String::new(),
            category,
            subcategory: None,
            match_keywords: Json(keywords.iter().map(|s| s.to_string()).collect()),
            match_brands: Json(brands.iter().map(|s| s.to_string()).collect()),
            importance: None,
            safety_warning: None,
            tools_needed: Json(Vec::new()),
            estimated_cost_diy: None,
            estimated_cost_professional: None,
            frequency_months: 12,
            season: None,
            region: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn component(category: ComponentCategory, name: &str, brand: &str, notes: &str) -> HomeComponent {
        HomeComponent {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            home_id: None,
            name: name.to_string(),
            category,
            brand: brand.to_string(),
            model: String::new(),
            notes: notes.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_category_mismatch_never_matches() {
        let hvac = template(ComponentCategory::Hvac, &["Carrier"], &["furnace"]);
        let sink = component(ComponentCategory::Plumbing, "Furnace room sink", "Carrier", "");
        assert!(!TemplateMatcher.matches(&hvac, &sink));
    }

    #[test]
    fn test_unconstrained_template_matches_on_category() {
        let hvac = template(ComponentCategory::Hvac, &[], &[]);
        let furnace = component(ComponentCategory::Hvac, "Furnace", "", "");
        assert!(TemplateMatcher.matches(&hvac, &furnace));
    }

    #[test]
    fn test_brand_is_case_insensitive_substring() {
        let t = template(ComponentCategory::Appliances, &["whirlpool"], &[]);
        assert!(TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::Appliances, "Dishwasher", "Whirlpool Corp", "")
        ));
        assert!(!TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::Appliances, "Dishwasher", "Bosch", "")
        ));
        assert!(!TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::Appliances, "Dishwasher", "", "")
        ));
    }

    #[test]
    fn test_keywords_search_all_text_fields() {
        let t = template(ComponentCategory::Hvac, &[], &["Heat Pump"]);
        assert!(TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::Hvac, "Outdoor unit", "", "installed heat pump 2019")
        ));
        assert!(TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::Hvac, "Heat pump", "", "")
        ));
        assert!(!TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::Hvac, "Furnace", "Lennox", "gas")
        ));
    }

    #[test]
    fn test_brand_and_keywords_must_both_hold() {
        let t = template(ComponentCategory::WaterHeater, &["Rheem"], &["tankless"]);
        assert!(TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::WaterHeater, "Tankless heater", "Rheem", "")
        ));
        assert!(!TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::WaterHeater, "Tank heater", "Rheem", "")
        ));
    }

    #[test]
    fn test_blank_entries_are_ignored() {
        let t = template(ComponentCategory::Roofing, &["  "], &[""]);
        assert!(TemplateMatcher.matches(
            &t,
            &component(ComponentCategory::Roofing, "Roof", "", "")
        ));
    }

    #[test]
    fn test_matching_filters_catalog() {
        let catalog = vec![
            template(ComponentCategory::Hvac, &[], &["filter"]),
            template(ComponentCategory::Hvac, &[], &[]),
            template(ComponentCategory::Plumbing, &[], &[]),
        ];
        let furnace = component(ComponentCategory::Hvac, "Furnace", "", "");
        let matched = TemplateMatcher.matching(&catalog, &furnace);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, catalog[1].id);
    }
}
