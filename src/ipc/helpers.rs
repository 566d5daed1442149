use rusqlite::{params_from_iter, types::Value, Connection};
use std::collections::HashMap;

use crate::formula;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

#[derive(Debug, Clone)]
pub struct ComponenteDef {
    pub id: String,
    pub codigo: String,
    pub nome: String,
    pub tipo: String,
    pub formula: Option<String>,
    pub sort_order: i64,
}

pub fn load_componentes(
    conn: &Connection,
    disciplina_id: &str,
) -> Result<Vec<ComponenteDef>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, codigo, nome, tipo, formula, sort_order
         FROM componentes
         WHERE disciplina_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt.query_map([disciplina_id], |r| {
        Ok(ComponenteDef {
            id: r.get(0)?,
            codigo: r.get(1)?,
            nome: r.get(2)?,
            tipo: r.get(3)?,
            formula: r.get(4)?,
            sort_order: r.get(5)?,
        })
    })?;
    rows.collect()
}

/// Resolves one aluno's componente values for a trimestre: entered values
/// come straight from `notas`, calculated ones run through the formula
/// evaluator in sort order (so a calculated componente may reference an
/// earlier calculated one). A formula failure makes that componente
/// unavailable for this aluno without aborting anything else.
pub fn resolve_componentes(
    conn: &Connection,
    componentes: &[ComponenteDef],
    aluno_id: &str,
    trimestre: i64,
) -> Result<Vec<Option<f64>>, rusqlite::Error> {
    let mut entered: HashMap<String, f64> = HashMap::new();
    if !componentes.is_empty() {
        let placeholders = std::iter::repeat("?")
            .take(componentes.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT componente_id, valor FROM notas
             WHERE aluno_id = ? AND trimestre = ? AND componente_id IN ({})",
            placeholders
        );
        let mut bind_values: Vec<Value> = Vec::with_capacity(componentes.len() + 2);
        bind_values.push(Value::Text(aluno_id.to_string()));
        bind_values.push(Value::Integer(trimestre));
        for c in componentes {
            bind_values.push(Value::Text(c.id.clone()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind_values), |r| {
            let componente_id: String = r.get(0)?;
            let valor: Option<f64> = r.get(1)?;
            Ok((componente_id, valor))
        })?;
        for row in rows {
            let (componente_id, valor) = row?;
            if let (Some(c), Some(v)) = (
                componentes.iter().find(|c| c.id == componente_id),
                valor,
            ) {
                entered.insert(c.codigo.clone(), v);
            }
        }
    }

    let mut values = entered;
    let mut resolved: Vec<Option<f64>> = Vec::with_capacity(componentes.len());
    for c in componentes {
        if c.tipo == "calculado" {
            let Some(expr) = c.formula.as_deref() else {
                resolved.push(None);
                continue;
            };
            match formula::evaluate(expr, &values) {
                Ok(v) => {
                    let v = formula::round2(v);
                    values.insert(c.codigo.clone(), v);
                    resolved.push(Some(v));
                }
                Err(e) => {
                    tracing::warn!(
                        componente = %c.codigo,
                        aluno = %aluno_id,
                        error = %e,
                        "formula evaluation failed; componente unavailable"
                    );
                    resolved.push(None);
                }
            }
        } else {
            resolved.push(values.get(&c.codigo).copied());
        }
    }
    Ok(resolved)
}

/// The disciplina's final grade is its `MF` componente when one exists,
/// otherwise the last componente by sort order.
pub fn final_nota(componentes: &[ComponenteDef], resolved: &[Option<f64>]) -> Option<f64> {
    let idx = componentes
        .iter()
        .position(|c| c.codigo.eq_ignore_ascii_case("MF"))
        .or_else(|| componentes.len().checked_sub(1))?;
    resolved.get(idx).copied().flatten()
}
