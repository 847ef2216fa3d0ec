//! Browsable HTML status document
//!
//! The document is rendered from a matrix read back from the interchange
//! table. Classifications are derived again here, so a persisted table and
//! the same metadata always reproduce the same page.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::StatusConfig;
use crate::release::metadata::{MetadataError, MetadataLookup, PackageMetadata};
use crate::status::classify::{
    CellClassification, CellStatus, ClassifyError, Classifier, RowClassification,
};
use crate::status::types::{ABSENT, Matrix, PackageKind, Platform, Row};

/// Position of the status and maintainer columns when metadata is rendered
const METADATA_COLUMN_INDEX: usize = 3;

/// Page assets, relative to the resource path; shipped under `resources/`
pub const SCRIPT_PATH: &str = "js/setup.js";
pub const STYLESHEET_PATH: &str = "css/status_page.css";

/// Renders matrices as HTML documents
pub struct DocumentRenderer<'a> {
    config: &'a StatusConfig,
    classifier: Classifier,
    resource_path: String,
}

impl<'a> DocumentRenderer<'a> {
    pub fn new(config: &'a StatusConfig) -> Result<Self, ClassifyError> {
        Ok(Self {
            config,
            classifier: Classifier::from_config(config)?,
            resource_path: String::new(),
        })
    }

    /// Directory prefix of the scripts and stylesheets referenced by the page
    pub fn with_resource_path(mut self, path: &str) -> Self {
        self.resource_path = if path.is_empty() || path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self
    }

    /// Render the full document.
    ///
    /// Status and maintainer columns are only added when `metadata` is given.
    pub fn render(
        &self,
        matrix: &Matrix,
        generated_at: DateTime<Utc>,
        metadata: Option<&dyn MetadataLookup>,
    ) -> String {
        let mut sorted = matrix.clone();
        sorted.sort_rows_by_name();

        let mut header = self.header_cells(&sorted);
        let mut counts = column_counts(&sorted);
        let mut rows: Vec<Vec<String>> = sorted
            .rows()
            .iter()
            .map(|row| {
                let classification = self.classifier.classify_row(&sorted, row);
                self.format_row(&sorted, row, &classification)
            })
            .collect();

        if let Some(lookup) = metadata {
            header.splice(
                METADATA_COLUMN_INDEX..METADATA_COLUMN_INDEX,
                ["Status".to_string(), "Maintainer".to_string()],
            );
            counts.splice(
                METADATA_COLUMN_INDEX..METADATA_COLUMN_INDEX,
                [Vec::new(), Vec::new()],
            );
            for (row, source) in rows.iter_mut().zip(sorted.rows()) {
                let (status, maintainer) = metadata_cells(lookup, source);
                row.splice(
                    METADATA_COLUMN_INDEX..METADATA_COLUMN_INDEX,
                    [status, maintainer],
                );
            }
        }

        // Wrapped for layout
        for row in &mut rows {
            row[0] = format!("<div>{}</div>", row[0]);
            row[1] = format!("<div>{}</div>", row[1]);
        }

        let mut body = self.legend();
        body.push_str(&table(&header, &counts, &rows));
        document(&self.head(generated_at), &body)
    }

    fn header_cells(&self, matrix: &Matrix) -> Vec<String> {
        let fixed = ["Name", "Version", "Kind"].map(str::to_string);
        let columns = matrix.platforms().iter().map(|platform| {
            let key = platform.key();
            let label = self
                .config
                .column_metadata(&key)
                .label
                .unwrap_or_else(|| capitalize(&key));
            escape_html(&label)
        });
        fixed.into_iter().chain(columns).collect()
    }

    fn format_row(&self, matrix: &Matrix, row: &Row, classification: &RowClassification) -> Vec<String> {
        let mut name = escape_html(&row.name);
        if classification.differs_across_platforms {
            name.push_str(" <span class=\"ht\">diff</span>");
        }

        let kind = match row.kind {
            PackageKind::SourceBuilt => "src",
            PackageKind::Prebuilt => "bin",
            PackageKind::Unknown => "?",
        };

        let mut cells = vec![
            name,
            escape_html(row.version.as_deref().unwrap_or_default()),
            kind.to_string(),
        ];

        let width = matrix.channels().len();
        for (p, platform) in matrix.platforms().iter().enumerate() {
            let url = self.job_url(row, platform);
            let column = matrix.column(row, p);
            let statuses = &classification.cells[p * width..(p + 1) * width];

            let mut cell: String = matrix
                .channels()
                .iter()
                .zip(column)
                .zip(statuses)
                .map(|((channel, version), status)| {
                    let link = (channel == self.config.link_channel())
                        .then_some(url.as_deref())
                        .flatten();
                    marker(channel, version.as_deref(), status, link)
                })
                .collect();

            if classification.changing_on_propagation[p] {
                cell.push_str("<span class=\"ht\">sync</span>");
            }
            cells.push(cell);
        }

        cells
    }

    /// Job link of one row and column, if the column has a template and the
    /// row is expected to be built there
    fn job_url(&self, row: &Row, platform: &Platform) -> Option<String> {
        match row.kind {
            PackageKind::Unknown => return None,
            PackageKind::Prebuilt if platform.is_source() => return None,
            _ => {}
        }
        let template = self.config.column_metadata(&platform.key()).job_url?;
        Some(template.replace("{pkg}", &row.name.replace('_', "-")))
    }

    fn head(&self, generated_at: DateTime<Utc>) -> String {
        let mut head = format!(
            "<title>{} - build status page - {}</title>\n",
            escape_html(&capitalize(&self.config.release)),
            generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        head.push_str("<meta http-equiv=\"Content-Type\" content=\"text/html;charset=utf-8\"/>\n");
        head.push_str(&format!(
            "<script type=\"text/javascript\" src=\"{}{}\"></script>\n",
            self.resource_path, SCRIPT_PATH
        ));
        head.push_str(&format!(
            "<link rel=\"stylesheet\" href=\"{}{}\" />\n",
            self.resource_path, STYLESHEET_PATH
        ));
        head
    }

    fn legend(&self) -> String {
        let squares: String = (1..=self.config.channels.len())
            .map(|i| format!("<span class=\"square\">{i}</span>"))
            .collect::<Vec<_>>()
            .join("&nbsp;");
        let repos: String = self
            .config
            .channels
            .iter()
            .enumerate()
            .map(|(i, channel)| format!("({}) {}", i + 1, escape_html(channel)))
            .collect::<Vec<_>>()
            .join(", ");

        let definitions = [
            ("src".to_string(), "built from a source package".to_string()),
            ("bin".to_string(), "binary-only package".to_string()),
            ("?".to_string(), "not declared by the release".to_string()),
            (squares, format!("The repositories {repos}")),
            (square("pkgLatest"), "same version".to_string()),
            (square("pkgOutdated"), "different version".to_string()),
            (square("pkgMissing"), "missing".to_string()),
            (square("pkgObsolete"), "obsolete".to_string()),
            (square("pkgIgnore"), "intentionally missing".to_string()),
            (square("pkgRegression"), format!(
                "regression (present in {})",
                escape_html(self.config.reference_channel())
            )),
        ];

        let items: Vec<String> = definitions
            .iter()
            .map(|(k, v)| format!("    <li><b>{k}:</b>&nbsp;{v}</li>"))
            .collect();
        format!("<ul>\n{}\n</ul>\n", items.join("\n"))
    }
}

/// Marker for one channel entry of a cell
fn marker(
    channel: &str,
    version: Option<&str>,
    classification: &CellClassification,
    url: Option<&str>,
) -> String {
    let mut classes = Vec::new();
    match classification.status {
        CellStatus::Current => {}
        CellStatus::Outdated => classes.push("o"),
        CellStatus::Missing => classes.push("m"),
        CellStatus::MissingNoExpectation => classes.push("i"),
        CellStatus::UnclassifiedPresent => classes.push("obs"),
    }
    if classification.regression {
        classes.push("r");
    }

    let mut html = String::from("<a");
    if !classes.is_empty() {
        html.push_str(&format!(" class=\"{}\"", classes.join(" ")));
    }
    html.push_str(&format!(
        " title=\"{}: {}\"",
        escape_html(channel),
        escape_html(version.unwrap_or(ABSENT))
    ));
    if let Some(url) = url {
        html.push_str(&format!(" href=\"{}\"", escape_html(url)));
    }
    html.push_str(" />");
    html
}

/// Non-absent entries per channel of every column; fixed columns have none
fn column_counts(matrix: &Matrix) -> Vec<Vec<usize>> {
    let width = matrix.channels().len();
    let mut counts = vec![Vec::new(); 3];
    for p in 0..matrix.platforms().len() {
        let mut column = vec![0; width];
        for row in matrix.rows() {
            for (c, cell) in matrix.column(row, p).iter().enumerate() {
                if cell.is_some() {
                    column[c] += 1;
                }
            }
        }
        counts.push(column);
    }
    counts
}

fn metadata_cells(lookup: &dyn MetadataLookup, row: &Row) -> (String, String) {
    if row.kind != PackageKind::SourceBuilt {
        return ("<div class=\"unknown\">--</div>".to_string(), String::new());
    }

    match lookup.lookup_metadata(&row.name) {
        Ok(Some(metadata)) => (status_cell(&metadata), maintainer_cell(&metadata)),
        Ok(None) => (status_cell(&PackageMetadata::default()), "?".to_string()),
        Err(e @ MetadataError::Malformed { .. }) => {
            warn!("{}", e);
            (
                status_cell(&PackageMetadata::default()),
                "invalid metadata".to_string(),
            )
        }
    }
}

fn status_cell(metadata: &PackageMetadata) -> String {
    let status = escape_html(metadata.status.as_deref().unwrap_or("unknown"));
    let title = match metadata.status_description.as_deref() {
        Some(description) if !description.is_empty() => {
            format!(" title=\"{}\"", escape_html(description))
        }
        _ => String::new(),
    };
    format!("<div class=\"{status}\"{title}>{status}</div>")
}

fn maintainer_cell(metadata: &PackageMetadata) -> String {
    metadata
        .maintainers
        .iter()
        .map(|m| match &m.email {
            Some(email) => format!(
                "<a href=\"mailto:{}\">{}</a>",
                escape_html(email),
                escape_html(&m.name)
            ),
            None => escape_html(&m.name),
        })
        .collect()
}

fn square(class: &str) -> String {
    format!("<span class=\"square {class}\">&nbsp;</span>")
}

fn table(columns: &[String], counts: &[Vec<usize>], rows: &[Vec<String>]) -> String {
    let headers: String = columns
        .iter()
        .zip(counts)
        .map(|(column, column_counts)| {
            let sums: String = column_counts
                .iter()
                .enumerate()
                .map(|(i, v)| format!("<span class=\"sum repo{}\">{}</span>", i + 1, v))
                .collect();
            format!("<th>{column}<br/>{sums}</th>")
        })
        .collect();
    let footer: String = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("<th>{}</th>", if i == 2 { "" } else { c.as_str() }))
        .collect();
    let body = rows
        .iter()
        .map(|row| {
            let cells: String = row.iter().map(|c| format!("<td>{c}</td>")).collect();
            format!("<tr>{cells}</tr>")
        })
        .collect::<Vec<_>>()
        .join("\n        ");

    format!(
        "<table class=\"display\" id=\"csv_table\">
    <thead>
        <tr>{headers}</tr>
    </thead>
    <tfoot>
        <tr>{footer}</tr>
    </tfoot>
    <tbody>
        {body}
    </tbody>
</table>
"
    )
}

fn document(head: &str, body: &str) -> String {
    format!("<!DOCTYPE html>\n<html>\n<head>\n{head}</head>\n<body>\n{body}</body>\n</html>\n")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
