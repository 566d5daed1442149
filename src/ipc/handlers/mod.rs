pub mod core;
pub mod disciplinas;
pub mod notas;
pub mod pauta;
pub mod turmas;
