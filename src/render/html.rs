use super::{ChartHandle, ChartMount, ChartSurface};
use crate::chart::ChartConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 16px; background: #f5f5f5; }
h1 { font-size: 20px; margin: 0 0 8px; }
.summary { display: flex; gap: 24px; margin-bottom: 16px; color: #333; }
.summary b { display: block; font-size: 18px; }
.grid { display: grid; grid-template-columns: repeat(3, 1fr); gap: 12px; }
.chart { height: 360px; background: #fff; border-radius: 4px; cursor: pointer; }
.modal { position: fixed; inset: 0; background: rgba(0, 0, 0, 0.7); z-index: 9999;
         display: flex; justify-content: center; align-items: center; }
.modal .close { position: absolute; top: 20px; right: 20px; font-size: 30px; color: #fff; cursor: pointer; }
.modal-chart { width: 90%; height: 80%; background: #fff; border-radius: 5px; }
"#;

// Each card gets a click handler and a resize listener. The fullscreen view
// removes its own listener and disposes its instance when closed.
const SCRIPT: &str = r#"
function withTooltip(option, tips) {
  option.tooltip.formatter = function (params) {
    const p = params.find(x => x.seriesType === 'candlestick');
    if (!p) return '';
    return (tips[p.dataIndex] || '').split('\n')
      .map((line, i) => i === 0 ? '<b>' + line + '</b>' : line)
      .join('<br/>');
  };
  return option;
}

function openFullscreen(m) {
  const modal = document.createElement('div');
  modal.className = 'modal';
  const close = document.createElement('div');
  close.className = 'close';
  close.innerHTML = '&times;';
  const box = document.createElement('div');
  box.className = 'modal-chart';
  modal.append(close, box);
  document.body.appendChild(modal);

  const chart = echarts.init(box);
  chart.setOption(withTooltip(m.fullscreen, m.tooltips));
  const onResize = () => chart.resize();
  window.addEventListener('resize', onResize);
  close.onclick = () => {
    window.removeEventListener('resize', onResize);
    chart.dispose();
    modal.remove();
  };
}

MOUNTS.forEach(m => {
  const node = document.getElementById(m.node);
  if (!node) return;
  const chart = echarts.init(node);
  chart.setOption(withTooltip(m.config, m.tooltips));
  node.onclick = () => openFullscreen(m);
  window.addEventListener('resize', () => chart.resize());
});
"#;

#[derive(Serialize)]
struct MountJs<'a> {
    node: &'a str,
    config: &'a ChartConfig,
    fullscreen: &'a ChartConfig,
    tooltips: &'a [String],
}

/// Surface that collects mounted charts into one static HTML dashboard.
pub struct HtmlPage {
    echarts_url: String,
    charts: BTreeMap<ChartHandle, ChartMount>,
    next_id: u64,
}

impl HtmlPage {
    pub fn new(echarts_url: impl Into<String>) -> Self {
        Self {
            echarts_url: echarts_url.into(),
            charts: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn get(&self, handle: ChartHandle) -> Option<&ChartMount> {
        self.charts.get(&handle)
    }

    /// Build the page. `summary` is shown above the chart grid as
    /// label/value pairs.
    pub fn render(&self, heading: &str, summary: &[(&str, String)]) -> Result<String, serde_json::Error> {
        let mounts: Vec<MountJs<'_>> = self
            .charts
            .values()
            .map(|m| MountJs {
                node: &m.node,
                config: &m.config,
                fullscreen: &m.fullscreen,
                tooltips: &m.tooltips,
            })
            .collect();
        // keep "</script>" inside a string from closing the tag
        let mounts_json = serde_json::to_string(&mounts)?.replace("</", "<\\/");

        let stats: String = summary
            .iter()
            .map(|(label, value)| format!("<div>{}<b>{}</b></div>", escape_html(label), escape_html(value)))
            .collect();
        let nodes: String = self
            .charts
            .values()
            .map(|m| format!("<div id=\"{}\" class=\"chart\"></div>\n", escape_html(&m.node)))
            .collect();

        Ok(format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <script src=\"{echarts}\"></script>\n<style>{style}</style>\n</head>\n<body>\n\
             <h1>{title}</h1>\n<div class=\"summary\">{stats}</div>\n<div class=\"grid\">\n{nodes}</div>\n\
             <script>\nconst MOUNTS = {mounts};\n{script}</script>\n</body>\n</html>\n",
            title = escape_html(heading),
            echarts = escape_html(&self.echarts_url),
            style = STYLE,
            stats = stats,
            nodes = nodes,
            mounts = mounts_json,
            script = SCRIPT,
        ))
    }

    /// Render and write the page, creating parent directories as needed.
    pub fn write_to(&self, path: &Path, heading: &str, summary: &[(&str, String)]) -> anyhow::Result<()> {
        let html = self.render(heading, summary)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, html)?;
        info!("Wrote {} charts to {:?}", self.charts.len(), path);
        Ok(())
    }
}

impl ChartSurface for HtmlPage {
    fn mount(&mut self, chart: ChartMount) -> ChartHandle {
        let handle = ChartHandle(self.next_id);
        self.next_id += 1;
        debug!("mount {} on {} as {:?}", chart.config.title.text, chart.node, handle);
        self.charts.insert(handle, chart);
        handle
    }

    fn dispose(&mut self, handle: ChartHandle) {
        if let Some(chart) = self.charts.remove(&handle) {
            debug!("dispose {:?} on {}", handle, chart.node);
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
