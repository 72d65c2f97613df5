use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::ScraperConfig;
use crate::constants::NOT_APPLICABLE;
use crate::error::{PipelineError, Result};

static TOTAL_RECORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Total Records : (\d+)").expect("valid regex"));
static RESULT_ROWS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("form[name=pcc_searchresult] table tr").expect("valid selector")
});
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));

/// Rows of layout and headings before the first result on every page.
const LEADING_ROWS: usize = 8;

/// One row of the committee registration search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitteeRow {
    pub committee: String,
    /// `"Last, First"` as published.
    pub candidate: String,
}

/// Extracts N from the `Total Records : N` marker.
pub fn parse_total_records(html: &str) -> Option<usize> {
    TOTAL_RECORDS
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn page_count(total: usize, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page)
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses up to `per_page` result rows from one results page.
pub fn parse_committee_rows(html: &str, per_page: usize) -> Vec<CommitteeRow> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_ROWS)
        .skip(LEADING_ROWS)
        .take(per_page)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELLS).collect();
            if cells.len() < 2 {
                debug!("Skipping result row with {} cells", cells.len());
                return None;
            }
            Some(CommitteeRow {
                committee: cell_text(&cells[1]),
                candidate: cell_text(&cells[0]),
            })
        })
        .collect()
}

/// Walks the paginated registration search and collects every committee row.
pub struct CommitteeScraper {
    client: reqwest::Client,
    config: ScraperConfig,
}

impl CommitteeScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    #[instrument(skip(self), fields(url = %self.config.url))]
    pub async fn scrape(&self) -> Result<Vec<CommitteeRow>> {
        let first = self
            .client
            .get(&self.config.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let total = parse_total_records(&first)
            .ok_or_else(|| PipelineError::Scrape("no 'Total Records' marker on first page".into()))?;
        let pages = page_count(total, self.config.per_page);
        info!("Found {} committees across {} pages", total, pages);

        let mut rows = Vec::with_capacity(total);
        'pages: for page in 1..=pages {
            info!("Fetching page {}/{}", page, pages);
            let html = self.fetch_page(page, total).await?;
            let page_rows = parse_committee_rows(&html, self.config.per_page);
            if page_rows.is_empty() {
                warn!("Page {} had no result rows", page);
            }
            for row in page_rows {
                rows.push(row);
                if rows.len() >= total {
                    break 'pages;
                }
            }
            tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        }

        Ok(rows)
    }

    async fn fetch_page(&self, page: usize, total: usize) -> Result<String> {
        let params = [
            ("ftype", "PCC".to_string()),
            ("whichpage", page.to_string()),
            ("DelCnt", total.to_string()),
            ("SQL_Order_by", String::new()),
            ("SQL_sort", String::new()),
            ("reg_comm_name", String::new()),
            ("ele_year", String::new()),
            ("reg_first_name", String::new()),
            ("reg_last_name", String::new()),
            ("mode_value", String::new()),
        ];
        let body = self
            .client
            .post(&self.config.url)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

/// Writes `committee,candidate`, leaving out rows whose committee is `N/A`.
pub fn write_committees(path: &Path, rows: &[CommitteeRow]) -> Result<usize> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| PipelineError::setup(dir, e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::from_csv_open(path, e))?;
    writer.write_record(["committee", "candidate"])?;

    let mut written = 0;
    for row in rows.iter().filter(|r| r.committee != NOT_APPLICABLE) {
        writer.write_record([&row.committee, &row.candidate])?;
        written += 1;
    }
    writer.flush()?;
    info!("Wrote {} committees to {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results_page(rows: &[(&str, &str)]) -> String {
        let mut html = String::from(
            "<html><body><p>Total Records : 23</p><form name=\"pcc_searchresult\"><table>",
        );
        for i in 0..LEADING_ROWS {
            html.push_str(&format!("<tr><td>layout {}</td></tr>", i));
        }
        for (candidate, committee) in rows {
            html.push_str(&format!(
                "<tr><td>{}</td><td>\n   {}  </td><td>2012</td></tr>",
                candidate, committee
            ));
        }
        html.push_str("</table></form></body></html>");
        html
    }

    #[test]
    fn total_records_marker() {
        assert_eq!(parse_total_records("<b>Total Records : 423</b>"), Some(423));
        assert_eq!(parse_total_records("<b>No results</b>"), None);
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(page_count(40, 20), 2);
        assert_eq!(page_count(41, 20), 3);
        assert_eq!(page_count(0, 20), 0);
    }

    #[test]
    fn rows_after_layout_are_parsed() {
        let html = results_page(&[("Bonds, Anita", "Friends of Anita Bonds"), ("X, John", "N/A")]);
        let rows = parse_committee_rows(&html, 20);

        assert_eq!(
            rows,
            vec![
                CommitteeRow {
                    committee: "Friends of Anita Bonds".into(),
                    candidate: "Bonds, Anita".into()
                },
                CommitteeRow {
                    committee: "N/A".into(),
                    candidate: "X, John".into()
                },
            ]
        );
    }

    #[test]
    fn at_most_one_page_of_rows() {
        let many: Vec<(String, String)> = (0..25)
            .map(|i| (format!("Last{}, First", i), format!("Committee {}", i)))
            .collect();
        let borrowed: Vec<(&str, &str)> = many.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();

        let rows = parse_committee_rows(&results_page(&borrowed), 20);
        assert_eq!(rows.len(), 20);
        assert_eq!(rows[19].committee, "Committee 19");
    }

    #[test]
    fn not_applicable_committees_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("committee-candidate.csv");
        let rows = vec![
            CommitteeRow { committee: "Friends of X".into(), candidate: "X, John".into() },
            CommitteeRow { committee: "N/A".into(), candidate: "Y, Jane".into() },
        ];

        assert_eq!(write_committees(&path, &rows).unwrap(), 1);
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "committee,candidate\nFriends of X,\"X, John\"\n");
    }
}
