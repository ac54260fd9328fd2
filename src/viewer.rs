use crate::store::{GraphStore, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to write viewer: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ViewError>;

/// Write a standalone HTML viewer: the graph JSON embedded in the page,
/// rendered with a small canvas force layout. No external assets.
pub fn run_view(input: &Path, out: Option<&Path>) -> Result<PathBuf> {
    let store = GraphStore::open(input)?;
    let papers = store.get_all_papers()?;
    let edges = store.get_all_edges()?;
    store.close()?;

    let graph = serde_json::json!({
        "nodes": papers.iter().map(|p| serde_json::json!({
            "id": p.id.unwrap_or_default(),
            "title": p.title,
            "year": p.year,
            "influence": p.influence_score,
        })).collect::<Vec<_>>(),
        "links": edges.iter().map(|e| serde_json::json!({
            "source": e.src,
            "target": e.dst,
            "type": e.edge_type.as_str(),
            "weight": e.weight,
        })).collect::<Vec<_>>(),
    });

    let out_path = match out {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("html"),
    };
    // </script> inside a title would end the embedded block early
    let payload = graph.to_string().replace("</", "<\\/");
    fs::write(&out_path, VIEWER_TEMPLATE.replace("{{GRAPH_JSON}}", &payload))?;
    info!("viewer written to {}", out_path.display());
    Ok(out_path)
}

const VIEWER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>PaperGraph</title>
<style>
  body { margin: 0; font: 13px sans-serif; background: #111; color: #ddd; }
  #info { position: fixed; top: 8px; left: 8px; max-width: 40em; pointer-events: none; }
  canvas { display: block; }
</style>
</head>
<body>
<div id="info"></div>
<canvas id="view"></canvas>
<script>
const graph = {{GRAPH_JSON}};
const canvas = document.getElementById('view');
const ctx = canvas.getContext('2d');
const info = document.getElementById('info');
let width, height;

function resize() {
  width = canvas.width = window.innerWidth;
  height = canvas.height = window.innerHeight;
}
window.addEventListener('resize', resize);
resize();

const nodes = graph.nodes.map((n, i) => ({
  ...n,
  x: width / 2 + Math.cos(i * 2.399963) * (40 + 6 * Math.sqrt(i)),
  y: height / 2 + Math.sin(i * 2.399963) * (40 + 6 * Math.sqrt(i)),
  vx: 0, vy: 0,
}));
const byId = new Map(nodes.map(n => [n.id, n]));
const links = graph.links
  .map(l => ({...l, a: byId.get(l.source), b: byId.get(l.target)}))
  .filter(l => l.a && l.b);

function tick() {
  for (const n of nodes) { n.vx *= 0.85; n.vy *= 0.85; }
  // pairwise repulsion
  for (let i = 0; i < nodes.length; i++) {
    for (let j = i + 1; j < nodes.length; j++) {
      const a = nodes[i], b = nodes[j];
      let dx = a.x - b.x, dy = a.y - b.y;
      const d2 = dx * dx + dy * dy + 0.01;
      if (d2 > 40000) continue;
      const f = 400 / d2;
      dx *= f; dy *= f;
      a.vx += dx; a.vy += dy; b.vx -= dx; b.vy -= dy;
    }
  }
  // spring attraction along links
  for (const l of links) {
    const dx = l.b.x - l.a.x, dy = l.b.y - l.a.y;
    const d = Math.sqrt(dx * dx + dy * dy) || 1;
    const f = (d - 60) * 0.005 * (l.weight || 1);
    l.a.vx += dx / d * f; l.a.vy += dy / d * f;
    l.b.vx -= dx / d * f; l.b.vy -= dy / d * f;
  }
  // gentle pull to the center
  for (const n of nodes) {
    n.vx += (width / 2 - n.x) * 0.002;
    n.vy += (height / 2 - n.y) * 0.002;
    n.x += n.vx; n.y += n.vy;
  }
}

function draw() {
  ctx.clearRect(0, 0, width, height);
  ctx.strokeStyle = 'rgba(120,160,220,0.25)';
  for (const l of links) {
    ctx.beginPath();
    ctx.moveTo(l.a.x, l.a.y);
    ctx.lineTo(l.b.x, l.b.y);
    ctx.stroke();
  }
  for (const n of nodes) {
    const r = 3 + 40 * (n.influence || 0);
    ctx.fillStyle = '#6af';
    ctx.beginPath();
    ctx.arc(n.x, n.y, Math.min(r, 14), 0, Math.PI * 2);
    ctx.fill();
  }
}

canvas.addEventListener('mousemove', (event) => {
  let best = null, bestDistance = 144;
  for (const n of nodes) {
    const dx = n.x - event.clientX, dy = n.y - event.clientY;
    const d2 = dx * dx + dy * dy;
    if (d2 < bestDistance) { best = n; bestDistance = d2; }
  }
  info.textContent = best ? `${best.title}${best.year ? ' (' + best.year + ')' : ''}` : '';
});

(function loop() {
  tick();
  draw();
  requestAnimationFrame(loop);
})();
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Paper};
    use tempfile::tempdir;

    #[test]
    fn viewer_embeds_the_graph() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("graph.db");
        let mut store = GraphStore::open(&db).unwrap();
        let ids = store
            .insert_papers(&[
                Paper::new("openalex", "W1", "A </script> title"),
                Paper::new("openalex", "W2", "Plain"),
            ])
            .unwrap();
        store
            .insert_edges(&[Edge::cites(ids[0], ids[1], serde_json::json!({}))])
            .unwrap();
        store.close().unwrap();

        let out = run_view(&db, None).unwrap();
        let html = fs::read_to_string(out).unwrap();
        assert!(html.contains("\"links\""));
        assert!(html.contains("Plain"));
        // embedded payload must not close the script block early
        assert!(!html.contains("A </script> title"));
    }
}
