//! Plain-text report rendering for tool results
//!
//! Every tool answers with a human-readable report; these builders produce
//! the exact wording clients of the original post office server expect.
//! Numeric columns are echoed as stored, only the stats report prints a
//! computed value.

use crate::store::{DeliveryGuyStats, PackageRecord};

fn field<'a>(package: &'a PackageRecord, column: &str) -> &'a str {
    package.get(column).unwrap_or("")
}

pub fn packages_for_delivery_guy_report(
    delivery_guy: i64,
    packages: &[&PackageRecord],
) -> String {
    let mut report = format!("Packages for Delivery Guy {delivery_guy}:\n");
    for package in packages {
        report.push_str(&format!("\nPackage {}:\n", package.package_id()));
        report.push_str(&format!("  Label: {}\n", package.label()));
        report.push_str(&format!("  Weight: {} kg\n", field(package, "weight_kg")));
        report.push_str(&format!("  Size: {}\n", field(package, "size_cm")));
        report.push_str(&format!(
            "  From: {} ({})\n",
            field(package, "sender_name"),
            field(package, "sender_address")
        ));
        report.push_str(&format!(
            "  To: {} ({})\n",
            field(package, "receiver_name"),
            field(package, "receiver_address")
        ));
    }
    report
}

pub fn package_details_report(package: &PackageRecord) -> String {
    let mut report = format!("Package Details: {}\n", package.package_id());
    report.push_str(&format!(
        "Assigned to: Delivery Guy {}\n",
        field(package, "delivery_guy")
    ));
    report.push_str(&format!("Label: {}\n", package.label()));
    report.push_str(&format!("Weight: {} kg\n", field(package, "weight_kg")));
    report.push_str(&format!("Size: {}\n", field(package, "size_cm")));
    report.push_str("\nSender:\n");
    report.push_str(&format!("  Name: {}\n", field(package, "sender_name")));
    report.push_str(&format!("  Address: {}\n", field(package, "sender_address")));
    report.push_str("\nReceiver:\n");
    report.push_str(&format!("  Name: {}\n", field(package, "receiver_name")));
    report.push_str(&format!(
        "  Address: {}\n",
        field(package, "receiver_address")
    ));
    report
}

pub fn delivery_guy_stats_report(stats: &DeliveryGuyStats) -> String {
    let mut report = format!("Delivery Statistics - Guy {}:\n", stats.delivery_guy);
    report.push_str(&format!("Total Packages: {}\n", stats.total_packages));
    report.push_str(&format!("Total Weight: {} kg\n", stats.total_weight_kg));
    report.push_str(&format!("Fragile Packages: {}\n", stats.fragile_packages));
    report.push_str(&format!("Urgent Packages: {}\n", stats.urgent_packages));
    report
}

pub fn all_delivery_guys_report(delivery_guys: &[i64]) -> String {
    let listed = delivery_guys
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Available Delivery Guys: {listed}")
}

pub fn packages_by_label_report(label: &str, packages: &[&PackageRecord]) -> String {
    let mut report = format!("Packages with label '{label}':\n");
    for package in packages {
        report.push_str(&format!(
            "\n{} - Delivery Guy {}\n",
            package.package_id(),
            field(package, "delivery_guy")
        ));
        report.push_str(&format!("  State: {}\n", package.state()));
        report.push_str(&format!("  Weight: {} kg\n", field(package, "weight_kg")));
        report.push_str(&format!("  To: {}\n", field(package, "receiver_name")));
    }
    report
}

pub fn packages_by_state_report(state: &str, packages: &[&PackageRecord]) -> String {
    let mut report = format!("Packages with state '{state}':\n");
    for package in packages {
        report.push_str(&format!(
            "\n{} - Delivery Guy {}\n",
            package.package_id(),
            field(package, "delivery_guy")
        ));
        report.push_str(&format!("  Label: {}\n", package.label()));
        report.push_str(&format!("  Weight: {} kg\n", field(package, "weight_kg")));
        report.push_str(&format!("  To: {}\n", field(package, "receiver_name")));
    }
    report
}
