//! # Reconciler
//! Converges the target table with the samples fetched for one identifier.
//!
//! The target table has no unique key, so `(point, timestamp)` uniqueness is kept
//! by matching before writing: a sample with no matching row creates one, a sample
//! with a matching row only refreshes the formatted time and value cells.

use std::collections::HashMap;

use chrono::{FixedOffset, Local, TimeZone, Utc};
use log::{info, warn};

use crate::{
    common::errors::{SchemaError, StoreError, WriteError},
    domain::synchronization::{
        identifier::normalize,
        table_store::{find_field, Field, FieldId, FieldKind, RowId, TableStore},
        value_objects::{
            sample::Sample,
            sync_config::{SyncConfig, TargetFieldNames, UpsertMatching},
        },
    },
};

/// Resolved ids of the four target fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFields {
    pub point: FieldId,
    pub timestamp: FieldId,
    pub time: FieldId,
    pub value: FieldId,
}

impl TargetFields {
    fn resolve(fields: &[Field], names: &TargetFieldNames) -> Result<Self, SchemaError> {
        let lookup = |name: &str| find_field(fields, name).map(|f| f.id.clone());
        match (
            lookup(names.point().as_str()),
            lookup(names.timestamp().as_str()),
            lookup(names.time().as_str()),
            lookup(names.value().as_str()),
        ) {
            (Some(point), Some(timestamp), Some(time), Some(value)) => Ok(Self {
                point,
                timestamp,
                time,
                value,
            }),
            _ => Err(SchemaError::UnresolvedFields(
                names
                    .all()
                    .into_iter()
                    .filter(|name| find_field(fields, name).is_none())
                    .map(String::from)
                    .collect(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<WriteError>,
}

/// Renders epoch milliseconds as `YYYY/MM/DD HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeFormatter {
    /// `None` uses the machine's local time zone.
    utc_offset_minutes: Option<i32>,
}

impl TimeFormatter {
    const FORMAT: &'static str = "%Y/%m/%d %H:%M:%S";

    pub fn new(utc_offset_minutes: Option<i32>) -> Self {
        Self { utc_offset_minutes }
    }

    pub fn format(&self, timestamp_ms: i64) -> String {
        let Some(instant) = Utc.timestamp_millis_opt(timestamp_ms).single() else {
            return timestamp_ms.to_string();
        };
        match self
            .utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
        {
            Some(offset) => instant.with_timezone(&offset).format(Self::FORMAT).to_string(),
            None => instant.with_timezone(&Local).format(Self::FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    names: TargetFieldNames,
    formatter: TimeFormatter,
    matching: UpsertMatching,
}

type RowKey = (String, String);

impl Reconciler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            names: config.target_fields().clone(),
            formatter: TimeFormatter::new(*config.utc_offset_minutes()),
            matching: *config.upsert_matching(),
        }
    }

    /// Ensures the four text fields exist and returns their ids. Safe to call repeatedly.
    pub async fn provision(&self, target: &dyn TableStore) -> Result<TargetFields, SchemaError> {
        let fields = target.list_fields().await?;
        let mut created_any = false;
        for name in self.names.all() {
            if find_field(&fields, name).is_some() {
                continue;
            }
            target
                .create_field(name, FieldKind::Text)
                .await
                .map_err(|source| SchemaError::FieldCreationFailed {
                    name: name.to_string(),
                    source,
                })?;
            info!("Created target field '{}'", name);
            created_any = true;
        }
        if !created_any {
            return TargetFields::resolve(&fields, &self.names);
        }
        // ids handed out during creation are not trusted; read them back
        let refreshed = target.list_fields().await?;
        TargetFields::resolve(&refreshed, &self.names)
    }

    pub async fn reconcile(
        &self,
        target: &dyn TableStore,
        point_id: &str,
        samples: &[Sample],
    ) -> Result<ReconcileReport, SchemaError> {
        let mut report = ReconcileReport::default();
        if samples.is_empty() {
            info!("{}: no data in the requested window", point_id);
            return Ok(report);
        }

        let fields = self.provision(target).await?;
        let mut index = match self.matching {
            UpsertMatching::KeyIndex => Some(self.build_index(target, &fields, point_id).await?),
            UpsertMatching::LinearScan => None,
        };

        for sample in samples {
            let timestamp = sample.timestamp.to_string();
            let existing = match index.as_ref() {
                Some(index) => index.get(&(point_id.to_string(), timestamp.clone())).cloned(),
                None => self.scan_for(target, &fields, point_id, &timestamp).await?,
            };
            let time = self.formatter.format(sample.timestamp);
            let value = sample.value.to_text();

            match existing {
                Some(row_id) => {
                    match self.update(target, &fields, &row_id, time, value).await {
                        Ok(()) => report.updated += 1,
                        Err(source) => {
                            warn!("{}: updating {} failed: {}", point_id, timestamp, source);
                            report.failed += 1;
                            report.errors.push(WriteError::UpdateFailed {
                                timestamp: sample.timestamp,
                                row_id,
                                source,
                            });
                        }
                    }
                }
                None => {
                    let cells = HashMap::from([
                        (fields.point.clone(), point_id.to_string()),
                        (fields.timestamp.clone(), timestamp.clone()),
                        (fields.time.clone(), time),
                        (fields.value.clone(), value),
                    ]);
                    match target.create_row(cells).await {
                        Ok(row_id) => {
                            report.created += 1;
                            if let Some(index) = index.as_mut() {
                                index.insert((point_id.to_string(), timestamp), row_id);
                            }
                        }
                        Err(source) => {
                            warn!("{}: creating {} failed: {}", point_id, timestamp, source);
                            report.failed += 1;
                            report.errors.push(WriteError::CreateFailed {
                                timestamp: sample.timestamp,
                                source,
                            });
                        }
                    }
                }
            }
        }

        if report.failed > 0 {
            warn!(
                "{}: created {}, updated {}, failed {}",
                point_id, report.created, report.updated, report.failed
            );
        } else {
            info!("{}: created {}, updated {}", point_id, report.created, report.updated);
        }
        Ok(report)
    }

    async fn update(
        &self,
        target: &dyn TableStore,
        fields: &TargetFields,
        row_id: &str,
        time: String,
        value: String,
    ) -> Result<(), StoreError> {
        target.update_cell(&fields.time, row_id, time).await?;
        target.update_cell(&fields.value, row_id, value).await
    }

    /// Reads the key cells of a row. Unreadable rows yield `None` and are skipped.
    async fn read_key(
        &self,
        target: &dyn TableStore,
        fields: &TargetFields,
        row_id: &str,
    ) -> Option<RowKey> {
        let cells = async {
            let point = target.read_cell(&fields.point, row_id).await?;
            let timestamp = target.read_cell(&fields.timestamp, row_id).await?;
            Ok::<_, StoreError>((point, timestamp))
        };
        match cells.await {
            Ok((point, timestamp)) => Some((
                normalize(&point).unwrap_or_default(),
                normalize(&timestamp).unwrap_or_default(),
            )),
            Err(e) => {
                warn!("Skipping target row {} while matching: {}", row_id, e);
                None
            }
        }
    }

    async fn build_index(
        &self,
        target: &dyn TableStore,
        fields: &TargetFields,
        point_id: &str,
    ) -> Result<HashMap<RowKey, RowId>, SchemaError> {
        let mut index = HashMap::new();
        for row_id in target.list_row_ids().await? {
            if let Some(key) = self.read_key(target, fields, &row_id).await {
                if key.0 == point_id {
                    index.entry(key).or_insert(row_id);
                }
            }
        }
        Ok(index)
    }

    async fn scan_for(
        &self,
        target: &dyn TableStore,
        fields: &TargetFields,
        point_id: &str,
        timestamp: &str,
    ) -> Result<Option<RowId>, SchemaError> {
        for row_id in target.list_row_ids().await? {
            if let Some((point, ts)) = self.read_key(target, fields, &row_id).await {
                if point == point_id && ts == timestamp {
                    return Ok(Some(row_id));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::synchronization::value_objects::cell_value::{CellValue, Fragment},
        infrastructure::table::MemoryTableStore,
    };

    fn reconciler(matching: UpsertMatching) -> Reconciler {
        Reconciler::new(
            &SyncConfig::new()
                .with_utc_offset_minutes(Some(0))
                .with_upsert_matching(matching),
        )
    }

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(1_700_000_000_000, "12.5"),
            Sample::new(1_700_003_600_000, 13.1),
        ]
    }

    #[test]
    fn it_should_format_time_in_the_configured_offset() {
        assert_eq!(
            TimeFormatter::new(Some(0)).format(1_700_000_000_000),
            "2023/11/14 22:13:20"
        );
        assert_eq!(
            TimeFormatter::new(Some(480)).format(1_700_000_000_000),
            "2023/11/15 06:13:20"
        );
    }

    #[tokio::test]
    async fn it_should_provision_missing_fields_once() {
        let target = MemoryTableStore::new("history");
        target.create_field("point", FieldKind::Text).await.unwrap();

        let r = reconciler(UpsertMatching::KeyIndex);
        let first = r.provision(&target).await.unwrap();
        let second = r.provision(&target).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(target.list_fields().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn it_should_fail_provisioning_on_a_locked_table() {
        let target = MemoryTableStore::new("locked");
        target.set_read_only(true);
        let err = reconciler(UpsertMatching::KeyIndex)
            .reconcile(&target, "1.1", &samples())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::FieldCreationFailed { ref name, .. } if name == "point"));
    }

    #[tokio::test]
    async fn it_should_skip_provisioning_without_samples() {
        let target = MemoryTableStore::new("history");
        let report = reconciler(UpsertMatching::KeyIndex)
            .reconcile(&target, "1.1", &[])
            .await
            .unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert!(target.list_fields().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn both_strategies_should_be_idempotent() {
        for matching in [UpsertMatching::LinearScan, UpsertMatching::KeyIndex] {
            let target = MemoryTableStore::new("history");
            let r = reconciler(matching);

            let first = r.reconcile(&target, "1.1.8.1", &samples()).await.unwrap();
            assert_eq!((first.created, first.updated), (2, 0));

            let second = r.reconcile(&target, "1.1.8.1", &samples()).await.unwrap();
            assert_eq!((second.created, second.updated), (0, 2));

            let rows = target.rows_by_name().await;
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0]["timestamp"], CellValue::text("1700000000000"));
            assert_eq!(rows[0]["time"], CellValue::text("2023/11/14 22:13:20"));
            assert_eq!(rows[1]["value"], CellValue::text("13.1"));
        }
    }

    #[tokio::test]
    async fn it_should_match_rich_text_keys_and_leave_them_untouched() {
        let target = MemoryTableStore::new("history");
        let r = reconciler(UpsertMatching::KeyIndex);
        r.provision(&target).await.unwrap();
        target
            .insert_named(vec![
                (
                    "point",
                    CellValue::RichTextSequence(vec![
                        Fragment::text("1.1"),
                        Fragment::text(".8.1").with_attribute("type", "mention"),
                    ]),
                ),
                ("timestamp", "1700000000000".into()),
                ("value", "old".into()),
            ])
            .await;

        let report = r
            .reconcile(&target, "1.1.8.1", &samples()[..1])
            .await
            .unwrap();
        assert_eq!((report.created, report.updated), (0, 1));

        let rows = target.rows_by_name().await;
        assert!(matches!(rows[0]["point"], CellValue::RichTextSequence(_)));
        assert_eq!(rows[0]["value"], CellValue::text("12.5"));
    }

    #[tokio::test]
    async fn it_should_collect_write_failures_without_raising() {
        let target = MemoryTableStore::new("history");
        let r = reconciler(UpsertMatching::LinearScan);
        r.provision(&target).await.unwrap();
        target.set_read_only(true);

        let report = r.reconcile(&target, "2.2", &samples()).await.unwrap();
        assert_eq!(report.failed, 2);
        assert!(matches!(report.errors[0], WriteError::CreateFailed { timestamp: 1_700_000_000_000, .. }));
    }
}
