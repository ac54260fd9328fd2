use crate::model::{Edge, Paper};
use crate::store::{GraphStore, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized export format: {0}")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Graphml,
    Gexf,
    Csv,
    Mermaid,
}

impl ExportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Graphml => "graphml",
            ExportFormat::Gexf => "gexf",
            ExportFormat::Csv => "csv",
            ExportFormat::Mermaid => "mmd",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "graphml" => Ok(ExportFormat::Graphml),
            "gexf" => Ok(ExportFormat::Gexf),
            "csv" => Ok(ExportFormat::Csv),
            "mermaid" => Ok(ExportFormat::Mermaid),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Mermaid output becomes unreadable past a few hundred edges.
const MERMAID_EDGE_CAP: usize = 200;

/// Export one store into the requested format. Returns the primary output
/// path (CSV also writes a sibling `*_edges.csv`).
pub fn run_export(input: &Path, format: ExportFormat, out: Option<&Path>) -> Result<PathBuf> {
    let store = GraphStore::open(input)?;
    let papers = store.get_all_papers()?;
    let edges = store.get_all_edges()?;
    let stats = store.stats()?;
    store.close()?;

    let out_path = match out {
        Some(path) => path.to_path_buf(),
        None => input.with_extension(format.extension()),
    };

    match format {
        ExportFormat::Json => {
            let document = serde_json::json!({
                "papers": papers,
                "edges": edges,
                "stats": stats.to_json(),
            });
            fs::write(&out_path, serde_json::to_string_pretty(&document)?)?;
        }
        ExportFormat::Graphml => fs::write(&out_path, to_graphml(&papers, &edges))?,
        ExportFormat::Gexf => fs::write(&out_path, to_gexf(&papers, &edges))?,
        ExportFormat::Csv => {
            fs::write(&out_path, papers_csv(&papers))?;
            let edges_path = sibling_edges_path(&out_path);
            fs::write(&edges_path, edges_csv(&edges))?;
        }
        ExportFormat::Mermaid => fs::write(&out_path, to_mermaid(&papers, &edges))?,
    }

    info!("exported {} papers, {} edges to {}", papers.len(), edges.len(), out_path.display());
    Ok(out_path)
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
    }
}

fn sibling_edges_path(papers_path: &Path) -> PathBuf {
    let stem = papers_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("graph");
    papers_path.with_file_name(format!("{}_edges.csv", stem))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn to_graphml(papers: &[Paper], edges: &[Edge]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="title" for="node" attr.name="title" attr.type="string"/>
  <key id="year" for="node" attr.name="year" attr.type="int"/>
  <key id="influence" for="node" attr.name="influence" attr.type="double"/>
  <key id="type" for="edge" attr.name="type" attr.type="string"/>
  <key id="weight" for="edge" attr.name="weight" attr.type="double"/>
  <graph id="papergraph" edgedefault="directed">
"#,
    );
    for paper in papers {
        let id = paper.id.unwrap_or_default();
        out.push_str(&format!("    <node id=\"n{}\">\n", id));
        out.push_str(&format!(
            "      <data key=\"title\">{}</data>\n",
            escape_xml(&paper.title)
        ));
        if let Some(year) = paper.year {
            out.push_str(&format!("      <data key=\"year\">{}</data>\n", year));
        }
        out.push_str(&format!(
            "      <data key=\"influence\">{}</data>\n",
            paper.influence_score
        ));
        out.push_str("    </node>\n");
    }
    for edge in edges {
        out.push_str(&format!(
            "    <edge source=\"n{}\" target=\"n{}\">\n      <data key=\"type\">{}</data>\n      <data key=\"weight\">{}</data>\n    </edge>\n",
            edge.src,
            edge.dst,
            edge.edge_type.as_str(),
            edge.weight
        ));
    }
    out.push_str("  </graph>\n</graphml>\n");
    out
}

fn to_gexf(papers: &[Paper], edges: &[Edge]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gexf xmlns="http://gexf.net/1.2" version="1.2">
  <graph defaultedgetype="directed">
    <nodes>
"#,
    );
    for paper in papers {
        out.push_str(&format!(
            "      <node id=\"{}\" label=\"{}\"/>\n",
            paper.id.unwrap_or_default(),
            escape_xml(&paper.title)
        ));
    }
    out.push_str("    </nodes>\n    <edges>\n");
    for (index, edge) in edges.iter().enumerate() {
        out.push_str(&format!(
            "      <edge id=\"{}\" source=\"{}\" target=\"{}\" weight=\"{}\" label=\"{}\"/>\n",
            index,
            edge.src,
            edge.dst,
            edge.weight,
            edge.edge_type.as_str()
        ));
    }
    out.push_str("    </edges>\n  </graph>\n</gexf>\n");
    out
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn papers_csv(papers: &[Paper]) -> String {
    let mut out =
        String::from("id,source,source_id,doi,arxiv_id,title,year,venue,citation_count,influence_score\n");
    for paper in papers {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            paper.id.unwrap_or_default(),
            escape_csv(&paper.source),
            escape_csv(&paper.source_id),
            escape_csv(paper.doi.as_deref().unwrap_or("")),
            escape_csv(paper.arxiv_id.as_deref().unwrap_or("")),
            escape_csv(&paper.title),
            paper.year.map(|y| y.to_string()).unwrap_or_default(),
            escape_csv(paper.venue.as_deref().unwrap_or("")),
            paper.citation_count,
            paper.influence_score,
        ));
    }
    out
}

fn edges_csv(edges: &[Edge]) -> String {
    let mut out = String::from("src,dst,type,weight,confidence,created_by\n");
    for edge in edges {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            edge.src,
            edge.dst,
            edge.edge_type.as_str(),
            edge.weight,
            edge.confidence,
            escape_csv(&edge.created_by),
        ));
    }
    out
}

fn to_mermaid(papers: &[Paper], edges: &[Edge]) -> String {
    let title_of = |id: i64| -> String {
        papers
            .iter()
            .find(|p| p.id == Some(id))
            .map(|p| {
                let mut title = p.title.clone();
                if title.chars().count() > 40 {
                    title = title.chars().take(37).collect::<String>() + "...";
                }
                title.replace('"', "'")
            })
            .unwrap_or_else(|| format!("#{}", id))
    };

    let mut out = String::from("graph LR\n");
    let mut declared: std::collections::BTreeSet<i64> = Default::default();
    for edge in edges.iter().take(MERMAID_EDGE_CAP) {
        for node in [edge.src, edge.dst] {
            if declared.insert(node) {
                out.push_str(&format!("    n{}[\"{}\"]\n", node, title_of(node)));
            }
        }
        out.push_str(&format!(
            "    n{} -->|{}| n{}\n",
            edge.src,
            edge.edge_type.as_str(),
            edge.dst
        ));
    }
    if edges.len() > MERMAID_EDGE_CAP {
        out.push_str(&format!(
            "    %% {} further edges omitted\n",
            edges.len() - MERMAID_EDGE_CAP
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seeded_store(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("graph.db");
        let mut store = GraphStore::open(&path).unwrap();
        let mut a = Paper::new("openalex", "W1", "Graphs, \"quoted\" & <tagged>");
        a.year = Some(2020);
        let b = Paper::new("openalex", "W2", "Second");
        let ids = store.insert_papers(&[a, b]).unwrap();
        store
            .insert_edges(&[crate::model::Edge::cites(
                ids[0],
                ids[1],
                serde_json::json!({}),
            )])
            .unwrap();
        store.close().unwrap();
        path
    }

    #[test]
    fn format_parsing() {
        assert_eq!(ExportFormat::from_str("json").unwrap(), ExportFormat::Json);
        assert_eq!(
            ExportFormat::from_str("mermaid").unwrap(),
            ExportFormat::Mermaid
        );
        assert!(ExportFormat::from_str("yaml").is_err());
    }

    #[test]
    fn json_export_has_papers_edges_and_stats() {
        let dir = tempdir().unwrap();
        let db = seeded_store(&dir);
        let out = run_export(&db, ExportFormat::Json, None).unwrap();
        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(document["papers"].as_array().unwrap().len(), 2);
        assert_eq!(document["edges"].as_array().unwrap().len(), 1);
        assert_eq!(document["edges"][0]["edge_type"], "CITES");
        assert_eq!(document["stats"]["papers"], 2);
    }

    #[test]
    fn graphml_escapes_markup() {
        let dir = tempdir().unwrap();
        let db = seeded_store(&dir);
        let out = run_export(&db, ExportFormat::Graphml, None).unwrap();
        let xml = fs::read_to_string(out).unwrap();
        assert!(xml.contains("&quot;quoted&quot; &amp; &lt;tagged&gt;"));
        assert!(xml.contains("<edge source=\"n1\" target=\"n2\">"));
    }

    #[test]
    fn csv_export_writes_both_files() {
        let dir = tempdir().unwrap();
        let db = seeded_store(&dir);
        let out = run_export(&db, ExportFormat::Csv, None).unwrap();
        let papers = fs::read_to_string(&out).unwrap();
        assert!(papers.lines().count() == 3); // header + 2 rows
        assert!(papers.contains("\"Graphs, \"\"quoted\"\" & <tagged>\""));

        let edges = fs::read_to_string(sibling_edges_path(&out)).unwrap();
        assert!(edges.starts_with("src,dst,type"));
        assert!(edges.contains("CITES"));
    }

    #[test]
    fn mermaid_declares_nodes_before_edges() {
        let dir = tempdir().unwrap();
        let db = seeded_store(&dir);
        let out = run_export(&db, ExportFormat::Mermaid, None).unwrap();
        let mermaid = fs::read_to_string(out).unwrap();
        assert!(mermaid.starts_with("graph LR"));
        assert!(mermaid.contains("n1 -->|CITES| n2"));
    }

    #[test]
    fn gexf_lists_nodes_and_edges() {
        let dir = tempdir().unwrap();
        let db = seeded_store(&dir);
        let out = run_export(&db, ExportFormat::Gexf, None).unwrap();
        let xml = fs::read_to_string(out).unwrap();
        assert!(xml.contains("<nodes>"));
        assert!(xml.contains("label=\"Second\""));
        assert!(xml.contains("weight=\"1\""));
    }
}
