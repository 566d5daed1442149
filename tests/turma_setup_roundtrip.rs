mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn turma_setup_round_trip_and_delete() {
    let workspace = temp_dir("pautad-setup");
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
        json!({
            "nome": "10ª A",
            "nivelEnsino": "Ensino Secundário",
            "classe": "10ª Classe",
            "anoLectivo": "2025/2026"
        }),
    );
    let turma_id = turma
        .get("turmaId")
        .and_then(|v| v.as_str())
        .expect("turmaId")
        .to_string();

    for (i, nome) in ["Ana Paulo", "Bruno Mateus"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("aluno-{}", i),
            "alunos.create",
            json!({ "turmaId": turma_id.clone(), "nome": nome }),
        );
    }

    let lp = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "disciplinas.create",
        json!({ "turmaId": turma_id.clone(), "nome": "Língua Portuguesa", "obrigatoria": true }),
    );
    let lp_id = lp
        .get("disciplinaId")
        .and_then(|v| v.as_str())
        .expect("disciplinaId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "disciplinas.create",
        json!({ "turmaId": turma_id.clone(), "nome": "História" }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "componentes.create",
        json!({ "disciplinaId": lp_id.clone(), "codigo": "MAC", "nome": "Média das Avaliações Contínuas", "tipo": "lancado" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "componentes.create",
        json!({ "disciplinaId": lp_id.clone(), "codigo": "EXAME", "nome": "Exame", "tipo": "lancado" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "componentes.create",
        json!({
            "disciplinaId": lp_id.clone(),
            "codigo": "MF",
            "nome": "Média Final",
            "tipo": "calculado",
            "formula": "MAC*0.4 + EXAME*0.6"
        }),
    );

    // A calculado componente with broken syntax is rejected up front.
    let bad = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "componentes.create",
        json!({
            "disciplinaId": lp_id.clone(),
            "codigo": "X",
            "nome": "Inválido",
            "tipo": "calculado",
            "formula": "(MAC + EXAME"
        }),
    );
    assert_eq!(bad.get("code").and_then(|v| v.as_str()), Some("bad_formula"));

    // An entered componente must not carry a formula.
    let bad = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "componentes.create",
        json!({
            "disciplinaId": lp_id.clone(),
            "codigo": "Y",
            "nome": "Inválido",
            "tipo": "lancado",
            "formula": "MAC"
        }),
    );
    assert_eq!(bad.get("code").and_then(|v| v.as_str()), Some("bad_params"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "turmas.list",
        json!({}),
    );
    let turmas = listed
        .get("turmas")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(turmas.len(), 1);
    assert_eq!(turmas[0].get("alunoCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(
        turmas[0].get("disciplinaCount").and_then(|v| v.as_i64()),
        Some(2)
    );

    let disciplinas = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "disciplinas.list",
        json!({ "turmaId": turma_id.clone() }),
    );
    let rows = disciplinas
        .get("disciplinas")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(rows.len(), 2);
    let lp_row = rows
        .iter()
        .find(|d| d.get("id").and_then(|v| v.as_str()) == Some(lp_id.as_str()))
        .expect("lp row");
    assert_eq!(lp_row.get("obrigatoria").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        lp_row.get("componenteCount").and_then(|v| v.as_i64()),
        Some(3)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "turmas.delete",
        json!({ "turmaId": turma_id }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "13", "turmas.list", json!({}));
    let turmas = listed
        .get("turmas")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert!(turmas.is_empty(), "turma should be gone after delete");
}
