/// Import and Recommend Example
///
/// This example demonstrates:
/// - Importing delimited text with type inference
/// - Mutating the table and reading its history
/// - Filtering and sorting through a view
/// - Scoring chart kinds and building a chart payload

use pulto_engine::import::import_delimited;
use pulto_engine::{chart_data, recommend_for_table, SemanticType, TableView};

fn main() -> pulto_engine::Result<()> {
    println!("=== Pulto Engine: Import and Recommend ===\n");

    // 1. Import
    let text = "date,region,revenue\n\
                2024-01-01,North,1200.5\n\
                2024-02-01,South,980\n\
                2024-03-01,North,1430.25\n\
                2024-04-01,East,1105\n\
                2024-05-01,South,1322\n";
    let mut table = import_delimited("sales", text, ',', true)?;
    println!("1. Imported '{}' with {} rows", table.name(), table.row_count());
    for (name, ty) in table.column_types() {
        println!("   {:<8} {}", name, ty);
    }

    // 2. Dates arrive as text; promote them
    table.set_column_type("date", SemanticType::Date)?;
    println!("\n2. 'date' is now {}", table.column("date").map(|c| c.semantic_type()).unwrap_or(SemanticType::String));

    // 3. Mutate
    table.set_value_by_name(1, "revenue", "1015")?;
    table.sort("revenue", false)?;
    println!("\n3. Top region by revenue: {}", table.get_value(0, "region").unwrap_or("-"));

    // 4. View
    let view = TableView::filter(&table, "south");
    println!("\n4. {} rows match 'south':", view.row_count());
    for row in view.iter_rows() {
        println!("   {}", row.join(" | "));
    }

    // 5. Recommend
    println!("\n5. Chart recommendations:");
    let recommendations = recommend_for_table(&table);
    for rec in &recommendations {
        println!("   {:?} {:.2}  {}", rec.chart_kind, rec.score, rec.reasoning);
    }
    if let Some(best) = recommendations.first() {
        let data = chart_data(&table, best.chart_kind)?;
        println!("\n   {:?}: {} vs {} ({} points)", data.kind, data.x_label, data.y_label, data.x.len());
    }

    // 6. History
    println!("\n6. History:");
    for record in table.history().records() {
        println!("   #{} {:<10} {}", record.id, record.kind.to_string(), record.description);
    }

    println!("\n7. CSV export:\n{}", table.to_csv());
    Ok(())
}
