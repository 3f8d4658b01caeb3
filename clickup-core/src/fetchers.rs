//! One fetcher per resource type.
//!
//! A fetcher takes the id of its parent and returns a lazy stream of typed records.
//! Parent ids that the payload may omit are filled in from the request.

use chrono::{DateTime, Months, Utc};
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::{ApiClient, Pagination, Query};
use crate::constants::OPEN_RANGE_YEARS;
use crate::error::Result;
use crate::models::{Folder, IdRef, List, Space, Task, Team, TimeEntry};

/// Date bounds for tasks and time entries. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn all_time() -> Self {
        Self::default()
    }

    /// `date_updated_gt` / `date_updated_lt` for the task listing, only for set bounds.
    pub fn task_query(&self) -> Query {
        let mut query = Query::new();
        if let Some(start) = self.start {
            query.push(("date_updated_gt".to_string(), start.timestamp_millis().to_string()));
        }
        if let Some(end) = self.end {
            query.push(("date_updated_lt".to_string(), end.timestamp_millis().to_string()));
        }
        query
    }

    /// Millisecond window for the time entry listing. The API only returns the last
    /// 30 days when no window is given, so open sides are pushed ten years out.
    pub fn time_entry_window(&self, now: DateTime<Utc>) -> (i64, i64) {
        let span = Months::new(OPEN_RANGE_YEARS as u32 * 12);
        let start = self
            .start
            .unwrap_or_else(|| now.checked_sub_months(span).unwrap_or(DateTime::<Utc>::MIN_UTC));
        let end = self
            .end
            .unwrap_or_else(|| now.checked_add_months(span).unwrap_or(DateTime::<Utc>::MAX_UTC));
        (start.timestamp_millis(), end.timestamp_millis())
    }
}

fn decode<T: DeserializeOwned>(item: Result<Value>) -> Result<T> {
    Ok(serde_json::from_value(item?)?)
}

fn archived_query(archived: bool) -> Query {
    vec![("archived".to_string(), archived.to_string())]
}

/// `GET team`: every workspace the token can see, members embedded.
pub fn fetch_teams(client: &ApiClient) -> impl Stream<Item = Result<Team>> + '_ {
    client
        .paginate("team".to_string(), Query::new(), "teams", Pagination::Single)
        .map(decode::<Team>)
}

pub fn fetch_spaces<'a>(
    client: &'a ApiClient,
    team_id: &str,
    archived: bool,
) -> impl Stream<Item = Result<Space>> + 'a {
    let team_id = team_id.to_string();
    client
        .paginate(
            format!("team/{}/space", team_id),
            archived_query(archived),
            "spaces",
            Pagination::Single,
        )
        .map(move |item| -> Result<Space> {
            let mut space: Space = decode(item)?;
            space.team_id = team_id.clone();
            Ok(space)
        })
}

pub fn fetch_folders<'a>(
    client: &'a ApiClient,
    space_id: &str,
    archived: bool,
) -> impl Stream<Item = Result<Folder>> + 'a {
    let space_id = space_id.to_string();
    client
        .paginate(
            format!("space/{}/folder", space_id),
            archived_query(archived),
            "folders",
            Pagination::Single,
        )
        .map(move |item| -> Result<Folder> {
            let mut folder: Folder = decode(item)?;
            folder.space_id = space_id.clone();
            Ok(folder)
        })
}

/// Lists inside a folder. The space id comes from the payload.
pub fn fetch_folder_lists<'a>(
    client: &'a ApiClient,
    folder_id: &str,
    archived: bool,
) -> impl Stream<Item = Result<List>> + 'a {
    let folder_id = folder_id.to_string();
    client
        .paginate(
            format!("folder/{}/list", folder_id),
            archived_query(archived),
            "lists",
            Pagination::Single,
        )
        .map(move |item| -> Result<List> {
            let mut list: List = decode(item)?;
            list.folder_id = Some(folder_id.clone());
            Ok(list)
        })
}

/// Lists placed directly in a space, outside any folder.
pub fn fetch_folderless_lists<'a>(
    client: &'a ApiClient,
    space_id: &str,
    archived: bool,
) -> impl Stream<Item = Result<List>> + 'a {
    let space_id = space_id.to_string();
    client
        .paginate(
            format!("space/{}/list", space_id),
            archived_query(archived),
            "lists",
            Pagination::Single,
        )
        .map(move |item| -> Result<List> {
            let mut list: List = decode(item)?;
            list.folder_id = None;
            list.space_id = Some(space_id.clone());
            Ok(list)
        })
}

/// Tasks of one list, closed tasks and subtasks included, page by page.
pub fn fetch_tasks<'a>(
    client: &'a ApiClient,
    list_id: &str,
    archived: bool,
    range: &DateRange,
) -> impl Stream<Item = Result<Task>> + 'a {
    let list_id = list_id.to_string();
    let mut query: Query = vec![
        ("include_closed".to_string(), "true".to_string()),
        ("subtasks".to_string(), "true".to_string()),
    ];
    query.extend(archived_query(archived));
    query.extend(range.task_query());

    client
        .paginate(
            format!("list/{}/task", list_id),
            query,
            "tasks",
            Pagination::PageNumber,
        )
        .map(move |item| -> Result<Task> {
            let mut task: Task = decode(item)?;
            if task.list.is_none() {
                task.list = Some(IdRef {
                    id: list_id.clone(),
                });
            }
            Ok(task)
        })
}

pub fn fetch_time_entries<'a>(
    client: &'a ApiClient,
    team_id: &str,
    range: &DateRange,
) -> impl Stream<Item = Result<TimeEntry>> + 'a {
    let team_id = team_id.to_string();
    let (start, end) = range.time_entry_window(Utc::now());
    let query: Query = vec![
        ("start_date".to_string(), start.to_string()),
        ("end_date".to_string(), end.to_string()),
    ];

    client
        .paginate(
            format!("team/{}/time_entries", team_id),
            query,
            "data",
            Pagination::Single,
        )
        .map(move |item| -> Result<TimeEntry> {
            let mut entry: TimeEntry = decode(item)?;
            entry.team_id = team_id.clone();
            Ok(entry)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::parse_date;

    #[test]
    fn test_task_query_only_sends_set_bounds() {
        assert!(DateRange::all_time().task_query().is_empty());

        let range = DateRange::new(Some(parse_date("2024-01-01").unwrap()), None);
        assert_eq!(
            range.task_query(),
            vec![("date_updated_gt".to_string(), "1704067200000".to_string())]
        );
    }

    #[test]
    fn test_open_time_entry_window() {
        let now = parse_date("2024-06-01").unwrap();
        let (start, end) = DateRange::all_time().time_entry_window(now);
        assert_eq!(start, parse_date("2014-06-01").unwrap().timestamp_millis());
        assert_eq!(end, parse_date("2034-06-01").unwrap().timestamp_millis());

        let range = DateRange::new(
            Some(parse_date("2024-01-01").unwrap()),
            Some(parse_date("2024-02-01").unwrap()),
        );
        assert_eq!(range.time_entry_window(now), (1_704_067_200_000, 1_706_745_600_000));
    }
}
