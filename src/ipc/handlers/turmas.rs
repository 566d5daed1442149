use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_turmas_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "turmas": [] }));
    };

    // Include basic counts so the caller can show a useful dashboard.
    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.nome,
           t.classe,
           t.nivel_ensino,
           t.ano_lectivo,
           (SELECT COUNT(*) FROM alunos a WHERE a.turma_id = t.id) AS aluno_count,
           (SELECT COUNT(*) FROM disciplinas d WHERE d.turma_id = t.id) AS disciplina_count
         FROM turmas t
         ORDER BY t.nome",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let nome: String = row.get(1)?;
            let classe: Option<String> = row.get(2)?;
            let nivel_ensino: String = row.get(3)?;
            let ano_lectivo: Option<String> = row.get(4)?;
            let aluno_count: i64 = row.get(5)?;
            let disciplina_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "nome": nome,
                "classe": classe,
                "nivelEnsino": nivel_ensino,
                "anoLectivo": ano_lectivo,
                "alunoCount": aluno_count,
                "disciplinaCount": disciplina_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(turmas) => ok(&req.id, json!({ "turmas": turmas })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_turmas_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
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
    let nivel_ensino = match req.params.get("nivelEnsino").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing nivelEnsino", None),
    };
    let classe = req
        .params
        .get("classe")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());
    let ano_lectivo = req
        .params
        .get("anoLectivo")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());

    let turma_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO turmas(id, nome, classe, nivel_ensino, ano_lectivo) VALUES(?, ?, ?, ?, ?)",
        (&turma_id, &nome, &classe, &nivel_ensino, &ano_lectivo),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "turmas" })),
        );
    }

    ok(&req.id, json!({ "turmaId": turma_id, "nome": nome }))
}

fn handle_turmas_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let turma_id = match required_str(req, "turmaId") {
        Ok(v) => v,
        Err(e) => return e,
    };

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

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute(
        "DELETE FROM notas
         WHERE componente_id IN (
           SELECT c.id
           FROM componentes c
           JOIN disciplinas d ON d.id = c.disciplina_id
           WHERE d.turma_id = ?
         )",
        [&turma_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute(
        "DELETE FROM componentes
         WHERE disciplina_id IN (SELECT id FROM disciplinas WHERE turma_id = ?)",
        [&turma_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute("DELETE FROM disciplinas WHERE turma_id = ?", [&turma_id]) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute("DELETE FROM alunos WHERE turma_id = ?", [&turma_id]) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute("DELETE FROM turmas WHERE id = ?", [&turma_id]) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

fn handle_alunos_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let turma_id = match required_str(req, "turmaId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT id, nome, numero, activo, sort_order
         FROM alunos
         WHERE turma_id = ?
         ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&turma_id], |row| {
            let id: String = row.get(0)?;
            let nome: String = row.get(1)?;
            let numero: Option<String> = row.get(2)?;
            let activo: i64 = row.get(3)?;
            let sort_order: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "nome": nome,
                "numero": numero,
                "activo": activo != 0,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(alunos) => ok(&req.id, json!({ "alunos": alunos })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_alunos_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let numero = req
        .params
        .get("numero")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());
    let activo = req
        .params
        .get("activo")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

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
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM alunos WHERE turma_id = ?",
        [&turma_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let aluno_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO alunos(id, turma_id, nome, numero, activo, sort_order)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &aluno_id,
            &turma_id,
            &nome,
            &numero,
            activo as i64,
            next_sort,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "alunos" })),
        );
    }

    ok(
        &req.id,
        json!({ "alunoId": aluno_id, "nome": nome, "sortOrder": next_sort }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "turmas.list" => Some(handle_turmas_list(state, req)),
        "turmas.create" => Some(handle_turmas_create(state, req)),
        "turmas.delete" => Some(handle_turmas_delete(state, req)),
        "alunos.list" => Some(handle_alunos_list(state, req)),
        "alunos.create" => Some(handle_alunos_create(state, req)),
        _ => None,
    }
}
