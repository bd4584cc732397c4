use crate::catalog::IndexError;
use indexmap::IndexMap;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorUrl {
    pub package: String,
    pub architecture: String,
    pub release: String,
    pub url: String,
    pub installs: i64,
}

// Two bound parameters per category.
fn popular_packages_sql(categories: usize) -> String {
    (0..categories)
        .map(|i| {
            format!(
                "SELECT package, num_installs FROM popcon WHERE category = ?{} AND num_installs > ?{}",
                i * 2 + 1,
                i * 2 + 2
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ")
}

/// A package present under several architectures or releases yields one URL per
/// catalog row. Popular packages with no catalog row are left out.
pub fn select_mirror_urls(
    conn: &Connection,
    base_url: &str,
    thresholds: &IndexMap<String, i64>,
) -> Result<Vec<MirrorUrl>, IndexError> {
    if thresholds.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT p.package, p.arch, p.release, i.filename, pop.num_installs \
         FROM ({}) pop \
         JOIN packages p ON p.package = pop.package \
         JOIN package_info i ON i.pack_id = p.pack_id \
         ORDER BY pop.num_installs DESC, i.filename, p.arch, p.release",
        popular_packages_sql(thresholds.len())
    );
    let mut values = Vec::with_capacity(thresholds.len() * 2);
    for (category, min_installs) in thresholds {
        values.push(Value::Text(category.clone()));
        values.push(Value::Integer(*min_installs));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        let filename: String = row.get(3)?;
        Ok(MirrorUrl {
            package: row.get(0)?,
            architecture: row.get(1)?,
            release: row.get(2)?,
            url: format!("{}{}", base_url, filename),
            installs: row.get(4)?,
        })
    })?;
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
