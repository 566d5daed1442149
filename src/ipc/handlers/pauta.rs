use crate::classify::{self, DisciplinaGrade};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, final_nota, load_componentes, required_i64, required_str, resolve_componentes,
    ComponenteDef,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

struct TurmaMeta {
    id: String,
    nome: String,
    classe: Option<String>,
    nivel_ensino: String,
    ano_lectivo: Option<String>,
}

struct DisciplinaDef {
    id: String,
    nome: String,
    obrigatoria: bool,
    componentes: Vec<ComponenteDef>,
}

fn load_turma(conn: &Connection, turma_id: &str) -> Result<Option<TurmaMeta>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, nome, classe, nivel_ensino, ano_lectivo FROM turmas WHERE id = ?",
        [turma_id],
        |r| {
            Ok(TurmaMeta {
                id: r.get(0)?,
                nome: r.get(1)?,
                classe: r.get(2)?,
                nivel_ensino: r.get(3)?,
                ano_lectivo: r.get(4)?,
            })
        },
    )
    .optional()
}

fn load_disciplinas(
    conn: &Connection,
    turma_id: &str,
) -> Result<Vec<DisciplinaDef>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, nome, obrigatoria
         FROM disciplinas
         WHERE turma_id = ?
         ORDER BY sort_order",
    )?;
    let rows: Vec<(String, String, bool)> = stmt
        .query_map([turma_id], |r| {
            let id: String = r.get(0)?;
            let nome: String = r.get(1)?;
            let obrigatoria: i64 = r.get(2)?;
            Ok((id, nome, obrigatoria != 0))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut disciplinas = Vec::with_capacity(rows.len());
    for (id, nome, obrigatoria) in rows {
        let componentes = load_componentes(conn, &id)?;
        disciplinas.push(DisciplinaDef {
            id,
            nome,
            obrigatoria,
            componentes,
        });
    }
    Ok(disciplinas)
}

/// Builds one aluno's pauta row: the resolved final grade per disciplina and
/// the classification verdict computed from them.
fn aluno_row(
    conn: &Connection,
    turma: &TurmaMeta,
    disciplinas: &[DisciplinaDef],
    obrigatorias: &HashSet<String>,
    aluno_id: &str,
    aluno_nome: &str,
    trimestre: i64,
) -> Result<serde_json::Value, rusqlite::Error> {
    let mut grades: Vec<DisciplinaGrade> = Vec::with_capacity(disciplinas.len());
    let mut disciplinas_json: Vec<serde_json::Value> = Vec::with_capacity(disciplinas.len());
    for d in disciplinas {
        let resolved = resolve_componentes(conn, &d.componentes, aluno_id, trimestre)?;
        let nota = final_nota(&d.componentes, &resolved);
        grades.push(DisciplinaGrade {
            id: d.id.clone(),
            nome: d.nome.clone(),
            nota,
        });
        disciplinas_json.push(json!({
            "disciplinaId": d.id,
            "nome": d.nome,
            "obrigatoria": d.obrigatoria,
            "nota": nota
        }));
    }

    let resultado = classify::classify(
        &grades,
        &turma.nivel_ensino,
        turma.classe.as_deref(),
        obrigatorias,
    );
    let status_label = resultado.status.to_string();

    Ok(json!({
        "aluno": { "id": aluno_id, "nome": aluno_nome },
        "disciplinas": disciplinas_json,
        "classificacao": resultado,
        "statusLabel": status_label
    }))
}

fn turma_header(turma: &TurmaMeta) -> serde_json::Value {
    json!({
        "id": turma.id,
        "nome": turma.nome,
        "classe": turma.classe,
        "nivelEnsino": turma.nivel_ensino,
        "anoLectivo": turma.ano_lectivo
    })
}

fn handle_pauta_turma_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let turma_id = match required_str(req, "turmaId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let trimestre = match required_i64(req, "trimestre") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let turma = match load_turma(conn, &turma_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "turma not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let disciplinas = match load_disciplinas(conn, &turma_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let obrigatorias: HashSet<String> = disciplinas
        .iter()
        .filter(|d| d.obrigatoria)
        .map(|d| d.id.clone())
        .collect();

    let mut stmt = match conn.prepare(
        "SELECT id, nome FROM alunos WHERE turma_id = ? ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let alunos: Vec<(String, String)> = match stmt
        .query_map([&turma_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut rows: Vec<serde_json::Value> = Vec::with_capacity(alunos.len());
    for (aluno_id, aluno_nome) in &alunos {
        match aluno_row(
            conn,
            &turma,
            &disciplinas,
            &obrigatorias,
            aluno_id,
            aluno_nome,
            trimestre,
        ) {
            Ok(row) => rows.push(row),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let disciplinas_json: Vec<serde_json::Value> = disciplinas
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "nome": d.nome,
                "obrigatoria": d.obrigatoria
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "turma": turma_header(&turma),
            "trimestre": trimestre,
            "disciplinas": disciplinas_json,
            "alunos": rows
        }),
    )
}

fn handle_pauta_aluno_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
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

    let aluno_row_db: Option<(String, String)> = match conn
        .query_row(
            "SELECT turma_id, nome FROM alunos WHERE id = ?",
            [&aluno_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((turma_id, aluno_nome)) = aluno_row_db else {
        return err(&req.id, "not_found", "aluno not found", None);
    };

    let turma = match load_turma(conn, &turma_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "turma not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let disciplinas = match load_disciplinas(conn, &turma_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let obrigatorias: HashSet<String> = disciplinas
        .iter()
        .filter(|d| d.obrigatoria)
        .map(|d| d.id.clone())
        .collect();

    let row = match aluno_row(
        conn,
        &turma,
        &disciplinas,
        &obrigatorias,
        &aluno_id,
        &aluno_nome,
        trimestre,
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "turma": turma_header(&turma),
            "trimestre": trimestre,
            "pauta": row
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "pauta.turmaModel" => Some(handle_pauta_turma_model(state, req)),
        "pauta.alunoModel" => Some(handle_pauta_aluno_model(state, req)),
        _ => None,
    }
}
