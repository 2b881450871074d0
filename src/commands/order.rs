use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
use tracing::{debug, info, warn};

use crate::cli::OrderArgs;
use crate::sheets::{GoogleSheetsClient, SheetsClient};

const PAPER_COLUMNS: usize = 12;
const SESSION_COLUMNS: usize = 5;

pub fn run(args: OrderArgs) -> Result<()> {
    let token = args
        .access_token
        .as_deref()
        .context("sheet-to-order requires --access-token or GOOGLE_SHEETS_ACCESS_TOKEN")?;
    let client = GoogleSheetsClient::new(token)?;

    let order = build_order(
        &client,
        &args.spreadsheet_id,
        &args.papers_range,
        &args.sessions_range,
        args.start_date,
    )?;

    fs::write(&args.output, &order)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        output = %args.output.display(),
        lines = order.lines().count(),
        "wrote order file"
    );

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledPaper {
    id: String,
    authors: String,
    title: String,
}

impl ScheduledPaper {
    fn from_row(row: &[String]) -> Result<(SessionKey, Self)> {
        let [id, authors, title, _track, _status, _country, _area, _kind, _group, block, session, _time] =
            row
        else {
            bail!("expected {PAPER_COLUMNS} columns, found {}", row.len());
        };

        let authors = if id.contains("TACL") {
            strip_author_emails(authors)
        } else {
            authors.clone()
        };

        Ok((
            (block.clone(), session.clone()),
            Self {
                id: id.clone(),
                authors,
                title: title.clone(),
            },
        ))
    }

    /// Regular submissions are listed by number; anything else carries its
    /// own title and authors.
    fn order_line(&self) -> String {
        if !self.id.is_empty() && self.id.chars().all(|c| c.is_ascii_digit()) {
            format!("{} # {}", self.id, self.title)
        } else {
            format!("! [{}] {} %by {}", self.id, self.title, self.authors)
        }
    }
}

type SessionKey = (String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionSlot {
    key: SessionKey,
    day_name: String,
    weekday: Weekday,
    start: String,
    end: String,
    title: String,
}

impl SessionSlot {
    fn from_row(row: &[String]) -> Result<Self> {
        let [block, session, date_and_time, _friendly_times, title] = row else {
            bail!("expected {SESSION_COLUMNS} columns, found {}", row.len());
        };

        let (day_name, time_frame) = date_and_time
            .split_once(", ")
            .with_context(|| format!("expected 'Day, start-end' but found '{date_and_time}'"))?;
        let weekday = day_name
            .trim()
            .parse::<Weekday>()
            .map_err(|_| anyhow::anyhow!("unknown day name '{day_name}'"))?;
        let (start, end) = time_frame
            .split_once('-')
            .with_context(|| format!("expected 'start-end' but found '{time_frame}'"))?;

        Ok(Self {
            key: (block.clone(), session.clone()),
            day_name: day_name.to_string(),
            weekday,
            start: hh_mm(start)?,
            end: hh_mm(end)?,
            title: title.clone(),
        })
    }
}

/// Renders the order file: a line per day, per session and per paper.
fn build_order(
    client: &dyn SheetsClient,
    spreadsheet_id: &str,
    papers_range: &str,
    sessions_range: &str,
    start_date: NaiveDate,
) -> Result<String> {
    let session_rows = client.get_values(spreadsheet_id, sessions_range)?;
    let paper_rows = client.get_values(spreadsheet_id, papers_range)?;

    let mut session_papers = BTreeMap::<SessionKey, Vec<ScheduledPaper>>::new();
    for (index, row) in paper_rows.iter().enumerate().skip(1) {
        match ScheduledPaper::from_row(row) {
            Ok((key, paper)) => session_papers.entry(key).or_default().push(paper),
            Err(err) => warn!(range = papers_range, row = index + 1, error = %err, "invalid paper row"),
        }
    }

    let week_start = start_date.week(Weekday::Mon).first_day();
    let mut lines = Vec::new();
    let mut previous_day: Option<String> = None;

    for (index, row) in session_rows.iter().enumerate().skip(1) {
        let slot = match SessionSlot::from_row(row) {
            Ok(slot) => slot,
            Err(err) => {
                warn!(range = sessions_range, row = index + 1, error = %err, "invalid session row");
                continue;
            }
        };

        if previous_day.as_deref() != Some(slot.day_name.as_str()) {
            let date = week_start + Duration::days(i64::from(slot.weekday.num_days_from_monday()));
            lines.push(date.format("* %a %d %b %Y (all times PST)").to_string());
            previous_day = Some(slot.day_name.clone());
        }

        lines.push(format!("= {}--{} {}", slot.start, slot.end, slot.title));

        let Some(papers) = session_papers.remove(&slot.key) else {
            debug!(block = %slot.key.0, session = %slot.key.1, "session has no papers");
            continue;
        };
        lines.extend(papers.iter().map(ScheduledPaper::order_line));
    }

    if !session_papers.is_empty() {
        let unused = session_papers
            .values()
            .flatten()
            .map(|paper| paper.id.as_str())
            .collect::<Vec<&str>>()
            .join(", ");
        warn!(papers = %unused, "papers not placed in any session");
    }

    Ok(lines.join("\n") + "\n")
}

/// `9:30AM` -> `09:30`, `2PM` -> `14:00`.
fn hh_mm(text: &str) -> Result<String> {
    let compact = text.split_whitespace().collect::<String>();
    let with_minutes = if compact.contains(':') || compact.len() < 2 {
        compact.clone()
    } else {
        match compact.split_at_checked(compact.len() - 2) {
            Some((hour, meridiem)) => format!("{hour}:00{meridiem}"),
            None => compact.clone(),
        }
    };

    let time = NaiveTime::parse_from_str(&with_minutes, "%I:%M%p")
        .with_context(|| format!("invalid 12-hour time '{text}'"))?;
    Ok(time.format("%H:%M").to_string())
}

/// `Ann Lee ann@x.org; Bo Chen: bo@y.org` -> `Ann Lee, Bo Chen`.
fn strip_author_emails(authors: &str) -> String {
    authors
        .split("; ")
        .map(|author_email| {
            let author_email = author_email.trim();
            let name = author_email
                .rsplit_once(char::is_whitespace)
                .map_or(author_email, |(name, _email)| name);
            name.trim_end_matches([':', ','])
        })
        .collect::<Vec<&str>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::fake::FakeSheets;

    const PAPERS: &str = "Final-AllPaperTimes!A:L";
    const SESSIONS: &str = "Detailed Schedule!A:E";

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    fn paper(id: &str, authors: &str, title: &str, block: &str, session: &str) -> Vec<String> {
        row(&[
            id, authors, title, "Main", "Accept", "US", "NLP", "Long", "G1", block, session,
            "Monday, 9AM-10AM",
        ])
    }

    fn schedule() -> FakeSheets {
        let mut sheets = FakeSheets::default();
        sheets.ranges.insert(
            PAPERS.to_string(),
            vec![
                row(&["Submission ID", "Authors", "Title"]),
                paper("101", "Ada Lovelace", "Paper One", "1", "A"),
                paper(
                    "TACL-7",
                    "Ann Lee ann@x.org; Bo Chen: bo@y.org",
                    "TACL Paper",
                    "1",
                    "A",
                ),
                paper("102", "Alan Turing", "Paper Two", "2", "B"),
                paper("103", "Kurt Godel", "Never Scheduled", "9", "Z"),
                row(&["104", "too short"]),
            ],
        );
        sheets.ranges.insert(
            SESSIONS.to_string(),
            vec![
                row(&["Block", "Session", "Date and Time", "Friendly", "Title"]),
                row(&["1", "A", "Monday, 9AM-10:30AM", "", "Session 1A: Parsing"]),
                row(&["2", "B", "Tuesday, 1:15PM-2PM", "", "Session 2B: Semantics"]),
                row(&["3", "C", "Tuesday, 3PM-4PM", "", "Poster Session"]),
                row(&["4", "D", "Someday, 3PM-4PM", "", "Broken"]),
            ],
        );
        sheets
    }

    #[test]
    fn order_lists_days_sessions_and_papers() {
        let sheets = schedule();
        let start = NaiveDate::from_ymd_opt(2021, 6, 9).expect("date");

        let order = build_order(&sheets, "sheet", PAPERS, SESSIONS, start).expect("order");
        assert_eq!(
            order,
            "* Mon 07 Jun 2021 (all times PST)\n\
             = 09:00--10:30 Session 1A: Parsing\n\
             101 # Paper One\n\
             ! [TACL-7] TACL Paper %by Ann Lee, Bo Chen\n\
             * Tue 08 Jun 2021 (all times PST)\n\
             = 13:15--14:00 Session 2B: Semantics\n\
             102 # Paper Two\n\
             = 15:00--16:00 Poster Session\n"
        );
        assert!(sheets.updates.borrow().is_empty());
    }

    #[test]
    fn missing_range_is_an_error() {
        let sheets = FakeSheets::default();
        let start = NaiveDate::from_ymd_opt(2021, 6, 7).expect("date");
        assert!(build_order(&sheets, "sheet", PAPERS, SESSIONS, start).is_err());
    }

    #[test]
    fn twelve_hour_times_convert() {
        assert_eq!(hh_mm("9:30AM").expect("time"), "09:30");
        assert_eq!(hh_mm("12PM").expect("time"), "12:00");
        assert_eq!(hh_mm("12:15AM").expect("time"), "00:15");
        assert_eq!(hh_mm(" 4 PM").expect("time"), "16:00");
        assert!(hh_mm("noon").is_err());
        assert!(hh_mm("").is_err());
    }

    #[test]
    fn emails_are_stripped_from_author_lists() {
        assert_eq!(
            strip_author_emails("Ann Lee ann@x.org; Bo Chen, bo@y.org; Cy"),
            "Ann Lee, Bo Chen, Cy"
        );
    }

    #[test]
    fn session_rows_need_every_column() {
        let err = SessionSlot::from_row(&row(&["1", "A", "Monday, 9AM-10AM"]))
            .expect_err("short row");
        assert!(err.to_string().contains("expected 5 columns"));
    }

    #[test]
    fn run_requires_an_access_token() {
        let args = OrderArgs {
            spreadsheet_id: "sheet".to_string(),
            papers_range: PAPERS.to_string(),
            sessions_range: SESSIONS.to_string(),
            start_date: NaiveDate::from_ymd_opt(2021, 6, 7).expect("date"),
            output: std::env::temp_dir().join("unused-order.txt"),
            access_token: None,
        };
        assert!(run(args).is_err());
    }
}
