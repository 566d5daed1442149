mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

fn create_componente(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    disciplina_id: &str,
    codigo: &str,
    tipo: &str,
    formula: Option<&str>,
) -> String {
    let mut params = json!({
        "disciplinaId": disciplina_id,
        "codigo": codigo,
        "nome": codigo,
        "tipo": tipo
    });
    if let Some(f) = formula {
        params["formula"] = json!(f);
    }
    let created = request_ok(stdin, reader, id, "componentes.create", params);
    created
        .get("componenteId")
        .and_then(|v| v.as_str())
        .expect("componenteId")
        .to_string()
}

#[test]
fn grid_resolves_calculated_componentes_and_degrades_on_failure() {
    let workspace = temp_dir("pautad-grid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let turma = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "turmas.create",
        json!({ "nome": "9ª B", "nivelEnsino": "Ensino Secundário" }),
    );
    let turma_id = turma
        .get("turmaId")
        .and_then(|v| v.as_str())
        .expect("turmaId")
        .to_string();

    let ana = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "alunos.create",
        json!({ "turmaId": turma_id.clone(), "nome": "Ana" }),
    );
    let ana_id = ana
        .get("alunoId")
        .and_then(|v| v.as_str())
        .expect("alunoId")
        .to_string();
    let bruno = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "alunos.create",
        json!({ "turmaId": turma_id.clone(), "nome": "Bruno" }),
    );
    let bruno_id = bruno
        .get("alunoId")
        .and_then(|v| v.as_str())
        .expect("alunoId")
        .to_string();

    let disciplina = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "disciplinas.create",
        json!({ "turmaId": turma_id.clone(), "nome": "Matemática", "obrigatoria": true }),
    );
    let disciplina_id = disciplina
        .get("disciplinaId")
        .and_then(|v| v.as_str())
        .expect("disciplinaId")
        .to_string();

    let mac_id = create_componente(&mut stdin, &mut reader, "6", &disciplina_id, "MAC", "lancado", None);
    let exame_id = create_componente(&mut stdin, &mut reader, "7", &disciplina_id, "EXAME", "lancado", None);
    let mf_id = create_componente(
        &mut stdin,
        &mut reader,
        "8",
        &disciplina_id,
        "MF",
        "calculado",
        Some("MAC*0.4 + EXAME*0.6"),
    );
    // Depends on EXAME as a divisor: fails for an aluno whose EXAME is 0.
    let _ratio_id = create_componente(
        &mut stdin,
        &mut reader,
        "9",
        &disciplina_id,
        "RATIO",
        "calculado",
        Some("MAC/EXAME"),
    );

    // Ana: fully graded.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "notas.set",
        json!({ "componenteId": mac_id.clone(), "alunoId": ana_id.clone(), "trimestre": 1, "valor": 10.0 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "notas.set",
        json!({ "componenteId": exame_id.clone(), "alunoId": ana_id.clone(), "trimestre": 1, "valor": 15.0 }),
    );
    // Bruno: EXAME entered as 0, so MF computes with 0 and RATIO divides by zero.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "notas.set",
        json!({ "componenteId": mac_id.clone(), "alunoId": bruno_id.clone(), "trimestre": 1, "valor": 8.0 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "notas.set",
        json!({ "componenteId": exame_id.clone(), "alunoId": bruno_id.clone(), "trimestre": 1, "valor": 0.0 }),
    );

    // Grades cannot be entered against a calculated componente.
    let rejected = request_err(
        &mut stdin,
        &mut reader,
        "14",
        "notas.set",
        json!({ "componenteId": mf_id, "alunoId": ana_id.clone(), "trimestre": 1, "valor": 20.0 }),
    );
    assert_eq!(
        rejected.get("code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "notas.grid",
        json!({ "disciplinaId": disciplina_id, "trimestre": 1 }),
    );
    assert_eq!(grid.get("rowCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(grid.get("colCount").and_then(|v| v.as_u64()), Some(4));

    let cells = grid.get("cells").and_then(|v| v.as_array()).expect("cells");
    let ana_row = cells[0].as_array().expect("ana row");
    let bruno_row = cells[1].as_array().expect("bruno row");

    // Columns follow componente sort order: MAC, EXAME, MF, RATIO.
    assert_eq!(ana_row[0].as_f64(), Some(10.0));
    assert_eq!(ana_row[1].as_f64(), Some(15.0));
    assert_eq!(ana_row[2].as_f64(), Some(13.0)); // 10*0.4 + 15*0.6
    assert_eq!(ana_row[3].as_f64(), Some(0.67)); // 10/15 rounded to 2 decimals

    assert_eq!(bruno_row[0].as_f64(), Some(8.0));
    assert_eq!(bruno_row[1].as_f64(), Some(0.0));
    assert_eq!(bruno_row[2].as_f64(), Some(3.2)); // 8*0.4 + 0*0.6
    assert!(bruno_row[3].is_null(), "division by zero leaves a null cell");
}

#[test]
fn missing_dependency_counts_as_zero_in_the_grid() {
    let workspace = temp_dir("pautad-grid-missing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let turma = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "turmas.create",
        json!({ "nome": "9ª C", "nivelEnsino": "Ensino Secundário" }),
    );
    let turma_id = turma
        .get("turmaId")
        .and_then(|v| v.as_str())
        .expect("turmaId")
        .to_string();
    let aluno = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "alunos.create",
        json!({ "turmaId": turma_id.clone(), "nome": "Carla" }),
    );
    let aluno_id = aluno
        .get("alunoId")
        .and_then(|v| v.as_str())
        .expect("alunoId")
        .to_string();
    let disciplina = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "disciplinas.create",
        json!({ "turmaId": turma_id, "nome": "Física" }),
    );
    let disciplina_id = disciplina
        .get("disciplinaId")
        .and_then(|v| v.as_str())
        .expect("disciplinaId")
        .to_string();

    let mac_id = create_componente(&mut stdin, &mut reader, "5", &disciplina_id, "MAC", "lancado", None);
    let _exame_id =
        create_componente(&mut stdin, &mut reader, "6", &disciplina_id, "EXAME", "lancado", None);
    let _mf_id = create_componente(
        &mut stdin,
        &mut reader,
        "7",
        &disciplina_id,
        "MF",
        "calculado",
        Some("MAC*0.4 + EXAME*0.6"),
    );

    // Only MAC is entered; EXAME resolves to 0 inside the formula.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "notas.set",
        json!({ "componenteId": mac_id, "alunoId": aluno_id, "trimestre": 1, "valor": 10.0 }),
    );

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "notas.grid",
        json!({ "disciplinaId": disciplina_id, "trimestre": 1 }),
    );
    let cells = grid.get("cells").and_then(|v| v.as_array()).expect("cells");
    let row = cells[0].as_array().expect("row");
    assert_eq!(row[0].as_f64(), Some(10.0));
    assert!(row[1].is_null(), "unentered componente stays empty");
    assert_eq!(row[2].as_f64(), Some(4.0)); // 10*0.4 + 0*0.6
}
