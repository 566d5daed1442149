use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, load_componentes, required_i64, required_str, resolve_componentes};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_notas_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let componente_id = match required_str(req, "componenteId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let aluno_id = match required_str(req, "alunoId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let trimestre = match required_i64(req, "trimestre") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let valor = match req.params.get("valor") {
        None => return err(&req.id, "bad_params", "missing valor", None),
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_f64() {
            Some(n) => Some(n),
            None => return err(&req.id, "bad_params", "valor must be a number or null", None),
        },
    };

    let tipo: Option<String> = match conn
        .query_row(
            "SELECT tipo FROM componentes WHERE id = ?",
            [&componente_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(tipo) = tipo else {
        return err(&req.id, "not_found", "componente not found", None);
    };
    if tipo == "calculado" {
        return err(
            &req.id,
            "bad_params",
            "calculado componentes are derived, not entered",
            None,
        );
    }

    let aluno_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM alunos WHERE id = ?", [&aluno_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if aluno_exists.is_none() {
        return err(&req.id, "not_found", "aluno not found", None);
    }

    let nota_id = Uuid::new_v4().to_string();
    let updated_at = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO notas(id, componente_id, aluno_id, trimestre, valor, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(componente_id, aluno_id, trimestre)
         DO UPDATE SET valor = excluded.valor, updated_at = excluded.updated_at",
        (
            &nota_id,
            &componente_id,
            &aluno_id,
            trimestre,
            valor,
            &updated_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "notas" })),
        );
    }

    ok(&req.id, json!({ "saved": true, "updatedAt": updated_at }))
}

fn handle_notas_grid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let disciplina_id = match required_str(req, "disciplinaId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let trimestre = match required_i64(req, "trimestre") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let disciplina_row: Option<(String, String)> = match conn
        .query_row(
            "SELECT turma_id, nome FROM disciplinas WHERE id = ?",
            [&disciplina_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((turma_id, disciplina_nome)) = disciplina_row else {
        return err(&req.id, "not_found", "disciplina not found", None);
    };

    let componentes = match load_componentes(conn, &disciplina_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, nome, sort_order, activo
         FROM alunos
         WHERE turma_id = ?
         ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let alunos: Vec<(String, String, i64, bool)> = match stmt
        .query_map([&turma_id], |r| {
            let id: String = r.get(0)?;
            let nome: String = r.get(1)?;
            let sort_order: i64 = r.get(2)?;
            let activo: i64 = r.get(3)?;
            Ok((id, nome, sort_order, activo != 0))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut alunos_json: Vec<serde_json::Value> = Vec::with_capacity(alunos.len());
    let mut cells: Vec<Vec<Option<f64>>> = Vec::with_capacity(alunos.len());
    for (aluno_id, nome, sort_order, activo) in &alunos {
        let row = match resolve_componentes(conn, &componentes, aluno_id, trimestre) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        alunos_json.push(json!({
            "id": aluno_id,
            "nome": nome,
            "sortOrder": sort_order,
            "activo": activo
        }));
        cells.push(row);
    }

    let componentes_json: Vec<serde_json::Value> = componentes
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

    ok(
        &req.id,
        json!({
            "disciplina": { "id": disciplina_id, "nome": disciplina_nome, "turmaId": turma_id },
            "trimestre": trimestre,
            "componentes": componentes_json,
            "alunos": alunos_json,
            "rowCount": cells.len(),
            "colCount": componentes_json.len(),
            "cells": cells
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notas.set" => Some(handle_notas_set(state, req)),
        "notas.grid" => Some(handle_notas_grid(state, req)),
        _ => None,
    }
}
