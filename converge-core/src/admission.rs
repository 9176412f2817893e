//! Synchronous create / update / delete surface.
//!
//! Every user-initiated change goes through here: structural validation,
//! identity immutability and the lifecycle gate run before the store write.

use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::gate::{self, FieldViolation};
use crate::resource::Resource;
use crate::store::{Record, ResourceStore, ResourceVersion, StoreError, Versioned};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("rejected: {}", gate::summarize(.0))]
    Rejected(Vec<FieldViolation>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The caller's version is stale.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AdmissionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(name) => AdmissionError::NotFound(name),
            StoreError::AlreadyExists(name) => AdmissionError::AlreadyExists(name),
            StoreError::VersionMismatch { expected, actual } => AdmissionError::Conflict(format!(
                "resource version {} is stale, current is {}",
                expected, actual
            )),
            other => AdmissionError::Store(other),
        }
    }
}

impl From<gate::Rejection> for AdmissionError {
    fn from(r: gate::Rejection) -> Self {
        AdmissionError::Rejected(r.violations)
    }
}

pub type Result<T> = std::result::Result<T, AdmissionError>;

type Stored<R> = Versioned<Record<<R as Resource>::Spec>>;

pub struct AdmissionBoundary<R: Resource> {
    store: Arc<dyn ResourceStore<R::Spec>>,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for AdmissionBoundary<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _kind: PhantomData,
        }
    }
}

impl<R: Resource> AdmissionBoundary<R> {
    pub fn new(store: Arc<dyn ResourceStore<R::Spec>>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    pub async fn get(&self, name: &str) -> Result<Stored<R>> {
        self.store
            .get(name)
            .await?
            .ok_or_else(|| AdmissionError::NotFound(name.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Stored<R>>> {
        Ok(self.store.list().await?)
    }

    pub async fn create(&self, name: &str, spec: R::Spec) -> Result<Stored<R>> {
        let mut violations = validate_name(name);
        violations.extend(R::validate(&spec, None));
        gate::Rejection::check(violations)?;
        gate::admit(R::gate(), None, None, &spec)?;

        let stored = self.store.create(Record::new(name, spec)).await?;
        info!("Admitted {} {}", R::KIND, name);
        Ok(stored)
    }

    /// Replace the spec. With `expected`, the write only succeeds if the
    /// record is still at that version.
    pub async fn update(
        &self,
        name: &str,
        spec: R::Spec,
        expected: Option<ResourceVersion>,
    ) -> Result<Stored<R>> {
        let current = self.get(name).await?;
        if let Some(expected) = expected {
            if expected != current.version {
                return Err(AdmissionError::Conflict(format!(
                    "resource version {} is stale, current is {}",
                    expected, current.version
                )));
            }
        }

        let old = &current.value;
        if old.metadata.deletion_requested {
            return Err(AdmissionError::Rejected(vec![FieldViolation::new(
                "metadata",
                "the resource is being deleted",
            )]));
        }

        let mut violations = R::validate(&spec, Some(&old.spec));
        violations.extend(R::immutable_violations(&old.spec, &spec));
        gate::Rejection::check(violations)?;
        gate::admit(R::gate(), old.status.phase, Some(&old.spec), &spec)?;

        if old.spec == spec {
            debug!("Update of {} {} is a no-op", R::KIND, name);
            return Ok(current);
        }

        let mut record = current.value.clone();
        record.spec = spec;
        let stored = self.store.update(record, current.version).await?;
        info!(
            "Admitted update of {} {} (generation {})",
            R::KIND,
            name,
            stored.value.metadata.generation
        );
        Ok(stored)
    }

    /// Request deletion. Returns the record while finalizers are pending,
    /// `None` once it is gone.
    pub async fn delete(&self, name: &str) -> Result<Option<Stored<R>>> {
        let current = self.get(name).await?;
        gate::admit_delete(R::gate(), current.value.status.phase)?;
        let result = self.store.request_deletion(name).await?;
        info!("Admitted deletion of {} {}", R::KIND, name);
        Ok(result)
    }
}

fn validate_name(name: &str) -> Vec<FieldViolation> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if valid {
        Vec::new()
    } else {
        vec![FieldViolation::new(
            "metadata.name",
            "must be 1-63 lowercase alphanumerics or '-', starting and ending with an alphanumeric",
        )]
    }
}
