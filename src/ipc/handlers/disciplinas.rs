use crate::formula::{self, FormulaError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, load_componentes, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

fn handle_disciplinas_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let turma_id = match required_str(req, "turmaId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT
           d.id,
           d.nome,
           d.obrigatoria,
           d.sort_order,
           (SELECT COUNT(*) FROM componentes c WHERE c.disciplina_id = d.id) AS componente_count
         FROM disciplinas d
         WHERE d.turma_id = ?
         ORDER BY d.sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&turma_id], |row| {
            let id: String = row.get(0)?;
            let nome: String = row.get(1)?;
            let obrigatoria: i64 = row.get(2)?;
            let sort_order: i64 = row.get(3)?;
            let componente_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "nome": nome,
                "obrigatoria": obrigatoria != 0,
                "sortOrder": sort_order,
                "componenteCount": componente_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(disciplinas) => ok(&req.id, json!({ "disciplinas": disciplinas })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_disciplinas_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let turma_id = match required_str(req, "turmaId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let nome = match req.params.get("nome").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing nome", None),
    };
    if nome.is_empty() {
        return err(&req.id, "bad_params", "nome must not be empty", None);
    }
    let obrigatoria = req
        .params
        .get("obrigatoria")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM turmas WHERE id = ?", [&turma_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "turma not found", None);
    }

    let next_sort: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM disciplinas WHERE turma_id = ?",
        [&turma_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let disciplina_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO disciplinas(id, turma_id, nome, obrigatoria, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (
            &disciplina_id,
            &turma_id,
            &nome,
            obrigatoria as i64,
            next_sort,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "disciplinas" })),
        );
    }

    ok(
        &req.id,
        json!({ "disciplinaId": disciplina_id, "nome": nome, "obrigatoria": obrigatoria }),
    )
}

fn handle_componentes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let disciplina_id = match required_str(req, "disciplinaId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let componentes = match load_componentes(conn, &disciplina_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let componentes: Vec<serde_json::Value> = componentes
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "codigo": c.codigo,
                "nome": c.nome,
                "tipo": c.tipo,
                "formula": c.formula,
                "sortOrder": c.sort_order
            })
        })
        .collect();

    ok(&req.id, json!({ "componentes": componentes }))
}

fn handle_componentes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let disciplina_id = match required_str(req, "disciplinaId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let codigo = match req.params.get("codigo").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing codigo", None),
    };
    if codigo.is_empty() {
        return err(&req.id, "bad_params", "codigo must not be empty", None);
    }
    let nome = match req.params.get("nome").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing nome", None),
    };
    let tipo = match req.params.get("tipo").and_then(|v| v.as_str()) {
        Some("lancado") => "lancado",
        Some("calculado") => "calculado",
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "tipo must be one of: lancado, calculado",
                Some(json!({ "tipo": other })),
            )
        }
        None => return err(&req.id, "bad_params", "missing tipo", None),
    };
    let formula_text = req
        .params
        .get("formula")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());

    if tipo == "calculado" {
        let Some(expr) = formula_text.as_deref() else {
            return err(
                &req.id,
                "bad_params",
                "calculado componente requires a formula",
                None,
            );
        };
        // Syntax check at creation time. Division by zero against an empty
        // mapping is not a syntax problem; it depends on entered values.
        if let Err(FormulaError::Syntax(msg)) = formula::evaluate(expr, &HashMap::new()) {
            return err(
                &req.id,
                "bad_formula",
                msg,
                Some(json!({ "formula": expr })),
            );
        }
    } else if formula_text.is_some() {
        return err(
            &req.id,
            "bad_params",
            "lancado componente must not carry a formula",
            None,
        );
    }

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM disciplinas WHERE id = ?",
            [&disciplina_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "disciplina not found", None);
    }

    let next_sort: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM componentes WHERE disciplina_id = ?",
        [&disciplina_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let componente_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO componentes(id, disciplina_id, codigo, nome, tipo, formula, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &componente_id,
            &disciplina_id,
            &codigo,
            &nome,
            tipo,
            &formula_text,
            next_sort,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "componentes" })),
        );
    }

    ok(
        &req.id,
        json!({ "componenteId": componente_id, "codigo": codigo, "tipo": tipo }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "disciplinas.list" => Some(handle_disciplinas_list(state, req)),
        "disciplinas.create" => Some(handle_disciplinas_create(state, req)),
        "componentes.list" => Some(handle_componentes_list(state, req)),
        "componentes.create" => Some(handle_componentes_create(state, req)),
        _ => None,
    }
}
