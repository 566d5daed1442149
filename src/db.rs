use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("pauta.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS turmas(
            id TEXT PRIMARY KEY,
            nome TEXT NOT NULL,
            classe TEXT,
            nivel_ensino TEXT NOT NULL,
            ano_lectivo TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS alunos(
            id TEXT PRIMARY KEY,
            turma_id TEXT NOT NULL,
            nome TEXT NOT NULL,
            numero TEXT,
            activo INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(turma_id) REFERENCES turmas(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alunos_turma ON alunos(turma_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alunos_turma_sort ON alunos(turma_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS disciplinas(
            id TEXT PRIMARY KEY,
            turma_id TEXT NOT NULL,
            nome TEXT NOT NULL,
            obrigatoria INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(turma_id) REFERENCES turmas(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_disciplinas_turma ON disciplinas(turma_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS componentes(
            id TEXT PRIMARY KEY,
            disciplina_id TEXT NOT NULL,
            codigo TEXT NOT NULL,
            nome TEXT NOT NULL,
            tipo TEXT NOT NULL,
            formula TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(disciplina_id) REFERENCES disciplinas(id),
            UNIQUE(disciplina_id, codigo)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_componentes_disciplina ON componentes(disciplina_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notas(
            id TEXT PRIMARY KEY,
            componente_id TEXT NOT NULL,
            aluno_id TEXT NOT NULL,
            trimestre INTEGER NOT NULL,
            valor REAL,
            updated_at TEXT,
            FOREIGN KEY(componente_id) REFERENCES componentes(id),
            FOREIGN KEY(aluno_id) REFERENCES alunos(id),
            UNIQUE(componente_id, aluno_id, trimestre)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notas_componente ON notas(componente_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notas_aluno ON notas(aluno_id)",
        [],
    )?;

    Ok(conn)
}
