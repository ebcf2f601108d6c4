use std::sync::Arc;

use crate::api::algorithm::{Algorithm, ExecutionContext};
use crate::data::workspace::{Workspace, WorkspaceGroup};
use crate::error::Result;
use crate::kernel::property::Direction;
use crate::kernel::property_manager::PropertyManager;
use crate::kernel::validators::MandatoryValidator;

/// Collect named data-service entries into a `WorkspaceGroup`.
///
/// Members are shared, not copied: the group refers to the same objects the
/// data service holds.
#[derive(Debug, Default)]
pub struct GroupWorkspaces;

impl Algorithm for GroupWorkspaces {
    fn name(&self) -> &str {
        "GroupWorkspaces"
    }

    fn category(&self) -> &str {
        "Transforms\\Grouping"
    }

    fn summary(&self) -> &str {
        "Takes workspaces as input and groups similar workspaces together."
    }

    fn init(&mut self, props: &mut PropertyManager) -> Result<()> {
        props.declare_property(
            "InputWorkspaces",
            Vec::<String>::new(),
            Some(Arc::new(MandatoryValidator)),
            Direction::Input,
        )?;
        props.declare_workspace("OutputWorkspace", Direction::Output, false, None)
    }

    fn exec(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let names: Vec<String> = ctx.get_property("InputWorkspaces")?;
        let mut group = WorkspaceGroup::new();
        for name in names {
            let member = ctx.ads().retrieve(&name)?;
            group.add(name, member)?;
        }
        log::debug!("{}: grouped {}", ctx.label(), group.names().join(", "));
        ctx.set_property("OutputWorkspace", Workspace::from_group(group))
    }
}
