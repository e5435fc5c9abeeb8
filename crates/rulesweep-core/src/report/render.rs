use crate::TOOL_NAME;
use crate::duplicates::DuplicateArtifact;
use crate::impact::ImpactReport;
use crate::report::model::Report;

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", TOOL_NAME, report.tool.version));
    out.push_str(&format!("Vendor: {}\n", report.vendor));
    out.push_str(&format!("Rules: {}\n", report.final_table.len()));
    out.push_str("Buckets:\n");
    for table in &report.buckets {
        out.push_str(&format!("  - {:<20} {}\n", table.bucket.as_str(), table.rows.len()));
    }
    out
}

pub fn render_duplicates(artifact: &DuplicateArtifact) -> String {
    let mut out = String::new();
    out.push_str(&format!("Duplicate groups: {}\n", artifact.groups));
    for e in &artifact.entries {
        out.push_str(&format!(
            "  [{}] {:<5} seq={} {}\n",
            e.group_id,
            e.role.as_str(),
            e.sequence,
            e.name
        ));
    }
    out
}

pub fn render_impact(report: &ImpactReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Moving '{}' from {} to {}: {} deny rule(s) checked\n",
        report.rule, report.from, report.to, report.candidates
    ));
    if let Some(partition) = &report.partition {
        out.push_str(&format!("Partition: {partition}\n"));
    }
    if report.affected.is_empty() {
        out.push_str("No deny rules bypassed.\n");
    }
    for a in &report.affected {
        out.push_str(&format!("  - seq={} {}\n", a.sequence, a.name));
    }
    out
}
