use tabled::Tabled;

#[derive(Tabled, Debug, Clone)]
pub struct OperationRow {
    #[tabled(rename = "scenario")]
    pub operation_id: String,
    pub succeeded: usize,
    pub failed: usize,
    #[tabled(display = "float2")]
    pub avg_time_ms: f64,
    #[tabled(display = "float2")]
    pub min_time_ms: f64,
    #[tabled(display = "float2")]
    pub max_time_ms: f64,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}
