//! Fetch orchestration.
//!
//! Resources are walked in dependency order. Each stage reads the parent ids that
//! earlier stages persisted, runs the fetcher once per parent and writes what comes
//! back in batches, so the whole account is never held in memory.

use futures::pin_mut;
use futures::stream::{LocalBoxStream, Stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::context::Context;
use crate::error::{ClickUpError, Result};
use crate::fetchers::{self, DateRange};
use crate::models::{Record, Resource, Row};
use crate::sink::SqliteSink;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Teams,
    Spaces,
    Folders,
    Lists,
    Tasks,
    TimeEntries,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Teams => Stage::Spaces,
            Stage::Spaces => Stage::Folders,
            Stage::Folders => Stage::Lists,
            Stage::Lists => Stage::Tasks,
            Stage::Tasks => Stage::TimeEntries,
            Stage::TimeEntries | Stage::Done => Stage::Done,
        }
    }

    /// Resources written by this stage.
    pub fn resources(self) -> &'static [Resource] {
        match self {
            Stage::Teams => &[Resource::Teams, Resource::Members],
            Stage::Spaces => &[Resource::Spaces],
            Stage::Folders => &[Resource::Folders],
            Stage::Lists => &[Resource::Lists],
            Stage::Tasks => &[Resource::Tasks],
            Stage::TimeEntries => &[Resource::TimeEntries],
            Stage::Done => &[],
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    rows: HashMap<Resource, usize>,
    /// Parents skipped because the API no longer knows them
    pub skipped: usize,
    pub elapsed: Duration,
}

impl FetchSummary {
    /// Rows written for `resource`, counting re-written rows again.
    pub fn rows(&self, resource: Resource) -> usize {
        self.rows.get(&resource).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.rows.values().sum()
    }

    fn add(&mut self, resource: Resource, written: usize) {
        *self.rows.entry(resource).or_insert(0) += written;
    }
}

pub struct Pipeline<'a> {
    client: &'a ApiClient,
    sink: &'a SqliteSink,
    batch_size: usize,
    archived: bool,
    range: DateRange,
    summary: FetchSummary,
}

impl<'a> Pipeline<'a> {
    pub fn new(client: &'a ApiClient, sink: &'a SqliteSink, ctx: &Context) -> Self {
        Self {
            client,
            sink,
            batch_size: ctx.batch_size.max(1),
            archived: ctx.archived,
            range: ctx.date_range(),
            summary: FetchSummary::default(),
        }
    }

    /// Runs every stage. Stops at the first failure that is not a vanished parent;
    /// batches committed before it stay in the database.
    pub async fn run(mut self) -> Result<FetchSummary> {
        let start = Instant::now();
        let mut stage = Stage::Teams;

        while stage != Stage::Done {
            info!("Stage: {:?}", stage);
            self.run_stage(stage).await?;
            for resource in stage.resources() {
                info!("✓ {}: {} rows", resource, self.summary.rows(*resource));
            }
            stage = stage.next();
        }

        self.summary.elapsed = start.elapsed();
        Ok(self.summary)
    }

    /// Visits every persisted id of each parent the stage's resources declare.
    async fn run_stage(&mut self, stage: Stage) -> Result<()> {
        if stage == Stage::Teams {
            return self.teams().await;
        }

        for &resource in stage.resources() {
            for &parent in resource.parents() {
                for id in self.parent_ids(resource, parent).await? {
                    let records = self
                        .fetcher(resource, parent, &id)
                        .map_err(|err| fetch_error(resource, Some(&id), err))?;
                    self.drain_parent(resource, &id, records).await?;
                }
            }
        }
        Ok(())
    }

    fn fetcher(
        &self,
        resource: Resource,
        parent: Resource,
        id: &str,
    ) -> Result<LocalBoxStream<'a, Result<Record>>> {
        let client = self.client;
        let archived = self.archived;

        let records = match (resource, parent) {
            (Resource::Spaces, Resource::Teams) => fetchers::fetch_spaces(client, id, archived)
                .map_ok(Record::from)
                .boxed_local(),
            (Resource::Folders, Resource::Spaces) => fetchers::fetch_folders(client, id, archived)
                .map_ok(Record::from)
                .boxed_local(),
            (Resource::Lists, Resource::Folders) => {
                fetchers::fetch_folder_lists(client, id, archived)
                    .map_ok(Record::from)
                    .boxed_local()
            }
            (Resource::Lists, Resource::Spaces) => {
                fetchers::fetch_folderless_lists(client, id, archived)
                    .map_ok(Record::from)
                    .boxed_local()
            }
            (Resource::Tasks, Resource::Lists) => {
                fetchers::fetch_tasks(client, id, archived, &self.range)
                    .map_ok(Record::from)
                    .boxed_local()
            }
            (Resource::TimeEntries, Resource::Teams) => {
                fetchers::fetch_time_entries(client, id, &self.range)
                    .map_ok(Record::from)
                    .boxed_local()
            }
            _ => {
                return Err(ClickUpError::Config(format!(
                    "no fetcher lists {} by {}",
                    resource, parent
                )))
            }
        };
        Ok(records)
    }

    async fn parent_ids(&self, resource: Resource, parent: Resource) -> Result<Vec<String>> {
        let ids = self
            .sink
            .ids(parent.table())
            .await
            .map_err(|err| fetch_error(resource, None, err))?;
        debug!("{}: {} {} to visit", resource, ids.len(), parent);
        Ok(ids)
    }

    /// Teams carry their members, so both tables are filled from one listing.
    async fn teams(&mut self) -> Result<()> {
        let records = fetchers::fetch_teams(self.client);
        pin_mut!(records);

        let mut teams = Vec::new();
        let mut members = Vec::new();

        while let Some(team) = records.next().await {
            let mut team = team.map_err(|err| fetch_error(Resource::Teams, None, err))?;
            members.extend(team.take_members().into_iter().map(|m| Record::from(m).into_row()));
            teams.push(Record::from(team).into_row());

            // Members reference their team, so teams are always written first.
            // A team with many members is split by flush.
            if teams.len() >= self.batch_size || members.len() >= self.batch_size {
                self.flush(Resource::Teams, &mut teams, None).await?;
                self.flush(Resource::Members, &mut members, None).await?;
            }
        }

        self.flush(Resource::Teams, &mut teams, None).await?;
        self.flush(Resource::Members, &mut members, None).await?;
        Ok(())
    }

    /// Drains one fetcher. A parent the API no longer knows is skipped.
    async fn drain_parent<S, T>(&mut self, resource: Resource, parent: &str, records: S) -> Result<()>
    where
        S: Stream<Item = Result<T>>,
        T: Into<Record>,
    {
        debug!("Fetching {} for {}", resource, parent);
        match self.drain(resource, parent, records).await {
            Err(ClickUpError::NotFound(path)) => {
                warn!("✗ Skipping {} for {}: {} not found", resource, parent, path);
                self.summary.skipped += 1;
                Ok(())
            }
            Err(err) => Err(fetch_error(resource, Some(parent), err)),
            Ok(()) => Ok(()),
        }
    }

    async fn drain<S, T>(&mut self, resource: Resource, parent: &str, records: S) -> Result<()>
    where
        S: Stream<Item = Result<T>>,
        T: Into<Record>,
    {
        pin_mut!(records);
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(record) = records.next().await {
            let record: Record = record?.into();
            batch.push(record.into_row());
            if batch.len() >= self.batch_size {
                self.flush(resource, &mut batch, Some(parent)).await?;
            }
        }
        self.flush(resource, &mut batch, Some(parent)).await
    }

    /// Writes `batch` in transactions of at most `batch_size` rows and empties it.
    async fn flush(&mut self, resource: Resource, batch: &mut Vec<Row>, parent: Option<&str>) -> Result<()> {
        for chunk in batch.chunks(self.batch_size) {
            let written = self
                .sink
                .upsert(resource.table(), chunk, resource.primary_key())
                .await
                .map_err(|err| fetch_error(resource, parent, err))?;
            self.summary.add(resource, written);
            info!("Saved {} {} rows", written, resource);
        }
        batch.clear();
        Ok(())
    }
}

fn fetch_error(resource: Resource, parent: Option<&str>, err: ClickUpError) -> ClickUpError {
    match err {
        // Already attributed
        ClickUpError::Fetch { .. } => err,
        err => ClickUpError::Fetch {
            resource,
            parent: parent.map(str::to_string),
            source: Box::new(err),
        },
    }
}
