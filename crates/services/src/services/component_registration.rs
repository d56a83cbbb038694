//! Template matching, registration and first generation for home components.
//!
//! Both entry points share one pipeline: match the component against the active
//! template catalog, register every match once, then run the registration
//! generator over exactly the registrations this call created.

use chrono::NaiveDate;
use db::{
    DBService,
    models::{
        home_component::{CreateHomeComponent, HomeComponent},
        task_registration::TaskRegistration,
        task_template::TaskTemplate,
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    registration_generator::{
        RegistrationGenerator, RegistrationGeneratorError, RegistrationScope,
        RegistrationSweepReport,
    },
    template_matcher::TemplateMatcher,
};

#[derive(Debug, Error)]
pub enum ComponentRegistrationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Generator(#[from] RegistrationGeneratorError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentRegistrationReport {
    pub component_id: Uuid,
    pub matched_templates: usize,
    pub new_registration_ids: Vec<Uuid>,
    pub generation: RegistrationSweepReport,
}

/// Optional narrowing of a backfill to one owner and/or one home.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillFilter {
    pub owner_id: Option<Uuid>,
    pub home_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillFailure {
    pub component_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub dry_run: bool,
    pub components_scanned: usize,
    pub active_templates: usize,
    pub total_matches: usize,
    /// Registrations created, or that would be created in a dry run.
    pub registrations_created: usize,
    pub existing_registrations: usize,
    pub errors: Vec<BackfillFailure>,
    /// Generation over the new registrations; absent in a dry run.
    pub generation: Option<RegistrationSweepReport>,
}

#[derive(Clone)]
pub struct ComponentRegistrationService {
    db: DBService,
    matcher: TemplateMatcher,
    generator: RegistrationGenerator,
}

impl ComponentRegistrationService {
    pub fn new(db: DBService) -> Self {
        let generator = RegistrationGenerator::new(db.clone());
        Self {
            db,
            matcher: TemplateMatcher,
            generator,
        }
    }

    /// Create a component and run the registration pipeline for it.
    pub async fn create_component(
        &self,
        data: &CreateHomeComponent,
        today: NaiveDate,
    ) -> Result<(HomeComponent, ComponentRegistrationReport), ComponentRegistrationError> {
        let component = HomeComponent::create(&self.db.pool, data, Uuid::new_v4()).await?;
        let report = self.on_component_created(&component, today).await?;
        Ok((component, report))
    }

    /// Register `component` against every matching active template and generate
    /// the first tasks for the registrations that did not exist before.
    pub async fn on_component_created(
        &self,
        component: &HomeComponent,
        today: NaiveDate,
    ) -> Result<ComponentRegistrationReport, ComponentRegistrationError> {
        let templates = TaskTemplate::find_all_active(&self.db.pool).await?;
        let matched = self.matcher.matching(&templates, component);

        let mut new_registration_ids = Vec::new();
        for template in &matched {
            let (registration, created) =
                TaskRegistration::get_or_create(&self.db.pool, component, template.id).await?;
            if created {
                debug!(
                    component_id = %component.id,
                    template_id = %template.id,
                    registration_id = %registration.id,
                    "Registered component for template"
                );
                new_registration_ids.push(registration.id);
            }
        }

        info!(
            component_id = %component.id,
            category = %component.category,
            matched = matched.len(),
            registered = new_registration_ids.len(),
            "Matched component against task templates"
        );

        let generation = self
            .generator
            .sweep(
                &RegistrationScope::Only(new_registration_ids.clone()),
                today,
                false,
            )
            .await?;

        Ok(ComponentRegistrationReport {
            component_id: component.id,
            matched_templates: matched.len(),
            new_registration_ids,
            generation,
        })
    }

    /// Run the registration pipeline over existing components. A dry run only
    /// reports what would be registered.
    pub async fn backfill(
        &self,
        filter: BackfillFilter,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<BackfillReport, ComponentRegistrationError> {
        let components =
            HomeComponent::find_filtered(&self.db.pool, filter.owner_id, filter.home_id).await?;
        let templates = TaskTemplate::find_all_active(&self.db.pool).await?;

        let mut report = BackfillReport {
            dry_run,
            components_scanned: components.len(),
            active_templates: templates.len(),
            ..Default::default()
        };
        let mut new_registration_ids = Vec::new();

        for component in &components {
            let matched = self.matcher.matching(&templates, component);
            if matched.is_empty() {
                continue;
            }
            report.total_matches += matched.len();

            for template in matched {
                let outcome = if dry_run {
                    TaskRegistration::find_by_component_and_template(
                        &self.db.pool,
                        component.id,
                        template.id,
                    )
                    .await
                    .map(|existing| (None, existing.is_none()))
                } else {
                    TaskRegistration::get_or_create(&self.db.pool, component, template.id)
                        .await
                        .map(|(registration, created)| (Some(registration.id), created))
                };

                match outcome {
                    Ok((registration_id, true)) => {
                        report.registrations_created += 1;
                        new_registration_ids.extend(registration_id);
                    }
                    Ok((_, false)) => report.existing_registrations += 1,
                    Err(e) => {
                        warn!(
                            component_id = %component.id,
                            template_id = %template.id,
                            error = %e,
                            "Backfill: failed to register component"
                        );
                        report.errors.push(BackfillFailure {
                            component_id: component.id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if !dry_run {
            report.generation = Some(
                self.generator
                    .sweep(&RegistrationScope::Only(new_registration_ids), today, false)
                    .await?,
            );
        }

        info!(
            components = report.components_scanned,
            templates = report.active_templates,
            matches = report.total_matches,
            created = report.registrations_created,
            existing = report.existing_registrations,
            dry_run,
            "Backfill complete"
        );
        Ok(report)
    }
}
