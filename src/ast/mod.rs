//! Surface syntax of the textual abstract assembly, as produced by the parser.
//! Names are still strings here; elaboration turns them into temps.

pub type Program = Vec<SurfaceProc>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceProc {
  pub name: String,
  pub lines: Vec<SurfaceLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOperand {
  /// A virtual register, e.g. `t1` or `x`
  Temp(String),
  /// A machine register, written `%rax`, stored without the `%`
  Reg(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceLine {
  Label(String),
  Move {
    assem: Option<String>,
    dst: SurfaceOperand,
    src: SurfaceOperand,
  },
  Oper {
    assem: String,
    defs: Vec<SurfaceOperand>,
    uses: Vec<SurfaceOperand>,
    jumps: Option<Vec<String>>,
  },
}
