//! Console rendering for plans and run summaries

use colored::*;
use std::fmt::Write;
use std::path::Path;

use crate::catalog::EntityCatalog;
use crate::provision::{EntityPhase, ProvisioningPlan, RunReport};

pub fn render_plan(catalog: &EntityCatalog, plan: &ProvisioningPlan) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", "Phase 1: create".bold());
    for (i, name) in plan.order().iter().enumerate() {
        let title = catalog.get(name).map_or(name.as_str(), |e| e.title.as_str());
        let properties: Vec<String> = plan
            .creation_properties(name)
            .iter()
            .map(|p| format!("{} ({})", p.name, p.kind.label()))
            .collect();
        let _ = writeln!(out, "  {}. {} \"{}\"", i + 1, name.cyan(), title);
        let _ = writeln!(out, "     {}", properties.join(", ").dimmed());
    }

    if !plan.edges().is_empty() {
        let _ = writeln!(out, "{}", "Dependencies".bold());
        for edge in plan.edges() {
            let _ = writeln!(out, "  {}.{} -> {}", edge.from, edge.property, edge.to);
        }
    }
    if !plan.back_edges().is_empty() {
        let _ = writeln!(out, "{}", "Cycles broken".bold());
        for edge in plan.back_edges() {
            let _ = writeln!(
                out,
                "  {}.{} -> {} (patched later)",
                edge.from, edge.property, edge.to
            );
        }
    }

    let _ = writeln!(out, "{}", "Phase 2: relations and rollups".bold());
    for (i, wave) in plan.relation_waves().iter().enumerate() {
        let labels: Vec<String> = wave.iter().map(|op| op.label()).collect();
        let _ = writeln!(out, "  wave {}: {}", i + 1, labels.join(", "));
    }

    let _ = writeln!(out, "{}", "Phase 3: self relations (best effort)".bold());
    for (i, wave) in plan.self_waves().iter().enumerate() {
        let labels: Vec<String> = wave.iter().map(|op| op.label()).collect();
        let _ = writeln!(out, "  wave {}: {}", i + 1, labels.join(", "));
    }

    out
}

pub fn render_failure(catalog: &EntityCatalog, report: &RunReport, manifest_path: &Path) -> String {
    let mut out = String::new();

    let failed_at = report.failed_at.as_deref().unwrap_or("unknown step");
    let _ = writeln!(out, "{} {}", "Provisioning failed at".red().bold(), failed_at.bold());
    if let Some(kind) = report.error {
        let message = report.error_message.as_deref().unwrap_or_default();
        let _ = writeln!(out, "  {}: {}", kind.to_string().red(), message);
        let _ = writeln!(out, "  {}", kind.hint().yellow());
    }

    for entity in catalog.entities() {
        let entry = report.manifest.entry(&entity.name);
        let phase = entry.map(|e| e.phase).unwrap_or_default();
        let id = entry.and_then(|e| e.remote_id.as_deref()).unwrap_or("-");
        let phase_label = match phase {
            EntityPhase::Pending => phase.to_string().dimmed(),
            EntityPhase::Complete => phase.to_string().green(),
            _ => phase.to_string().yellow(),
        };
        let _ = writeln!(out, "  {:<16} {:<18} {}", entity.name, phase_label, id);
    }

    let _ = writeln!(
        out,
        "Progress saved to {}; run the same command again to resume.",
        manifest_path.display()
    );
    out
}

pub fn render_manual_actions(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        "Some self relations need to be finished by hand:".yellow().bold()
    );
    for action in &report.manual_action_required {
        let _ = writeln!(out, "  - {}.{}: {}", action.entity, action.property, action.instruction);
    }
    out
}
