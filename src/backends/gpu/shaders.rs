//! WGSL source for the tiled matrix multiplication kernel
//!
//! Workgroup arrays need compile-time lengths, so the dimension and the
//! local size are baked into the generated source instead of being passed
//! through a uniform.

use super::workgroup::{StagingMode, WorkgroupPlan};

/// Entry point of every generated kernel
pub const ENTRY_POINT: &str = "main";

/// Generates the tiled product kernel for a launch plan
///
/// Computes C = A × B for `N x N` row-major matrices where:
/// - invocation `j` (global id) owns output column `j`
/// - the work-group stages row `i` of A in workgroup memory once per row
/// - with [`StagingMode::RowAndColumns`], the group's `LOCAL` columns of B
///   are staged once up front as `b_cols[k * LOCAL + col]`
///
/// Barriers separate staging from use, and a trailing barrier keeps the
/// next row from overwriting `a_row` while slower invocations still read it.
pub fn tiled_matmul_shader(plan: &WorkgroupPlan) -> String {
    let dim = plan.global();
    let local = plan.local();

    let (column_decl, column_stage, column_read) = match plan.staging() {
        StagingMode::RowAndColumns => (
            format!("var<workgroup> b_cols: array<f32, {}>;", dim * local),
            r#"
    for (var idx: u32 = il; idx < DIM * LOCAL; idx = idx + LOCAL) {
        let k = idx / LOCAL;
        let col = idx % LOCAL;
        b_cols[idx] = b[k * DIM + base + col];
    }
    workgroupBarrier();
"#,
            "b_cols[k * LOCAL + il]",
        ),
        StagingMode::RowOnly => (String::new(), "", "b[k * DIM + j]"),
    };

    format!(
        r#"
const DIM: u32 = {dim}u;
const LOCAL: u32 = {local}u;

@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> c: array<f32>;

var<workgroup> a_row: array<f32, {dim}>;
{column_decl}

@compute @workgroup_size({local})
fn {ENTRY_POINT}(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) group_id: vec3<u32>,
) {{
    let j = global_id.x;
    let il = local_id.x;
    let base = group_id.x * LOCAL;
{column_stage}
    for (var i: u32 = 0u; i < DIM; i = i + 1u) {{
        for (var k: u32 = il; k < DIM; k = k + LOCAL) {{
            a_row[k] = a[i * DIM + k];
        }}
        workgroupBarrier();

        var sum: f32 = 0.0;
        for (var k: u32 = 0u; k < DIM; k = k + 1u) {{
            sum = sum + a_row[k] * {column_read};
        }}
        c[i * DIM + j] = sum;
        workgroupBarrier();
    }}
}}
"#
    )
}
