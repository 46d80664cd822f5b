//! Feature modules. Each module owns a set of command keys and converts
//! those commands; bind routers hand binds of foreign policies to the module
//! that owns the policy through [`Handled::Delegate`].

pub mod aaa;
pub mod adv_expression;
pub mod appfw;
pub mod cache_redirection;
pub mod content_switching;
pub mod cs_precedence;
pub mod http_profile;
pub mod lb;
pub mod named_expression;
pub mod ns_features;
pub mod policy_entities;
pub mod rewrite;
pub mod ssl;
pub mod tm_session;
pub mod unsupported;
pub mod vpn;

use std::fmt::{self, Display, Formatter};

use ns_config_core::CommandTree;
use serde::Serialize;

use crate::binds::BindDefaults;
use crate::context::ConversionContext;
use crate::error::ConvertError;
use crate::output::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ModuleId {
    LoadBalancing,
    CacheRedirection,
    TmSession,
    Vpn,
    AppFw,
    PolicyEntities,
    NamedExpression,
    HttpProfile,
    ContentSwitching,
    Aaa,
    AdvExpression,
    Ssl,
    Unsupported,
    NsFeatures,
    Rewrite,
    /// Policies added by commands no module converts.
    External,
}

impl ModuleId {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleId::LoadBalancing => "loadbalancing",
            ModuleId::CacheRedirection => "cacheredirection",
            ModuleId::TmSession => "tmsession",
            ModuleId::Vpn => "vpn",
            ModuleId::AppFw => "appfw",
            ModuleId::PolicyEntities => "policyentities",
            ModuleId::NamedExpression => "namedexpression",
            ModuleId::HttpProfile => "httpprofile",
            ModuleId::ContentSwitching => "contentswitching",
            ModuleId::Aaa => "aaa",
            ModuleId::AdvExpression => "advexpression",
            ModuleId::Ssl => "ssl",
            ModuleId::Unsupported => "unsupported",
            ModuleId::NsFeatures => "nsfeatures",
            ModuleId::Rewrite => "rewrite",
            ModuleId::External => "external",
        }
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity kinds a policy can be bound to through another module's bind
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindCategory {
    User,
    Group,
    Lb,
    ContentSwitching,
    CacheRedirection,
    Authentication,
}

/// A bind whose policy belongs to another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub category: BindCategory,
    /// Module that converted the bound policy.
    pub owner: ModuleId,
    /// Lowercased policy name.
    pub policy: String,
    pub tree: CommandTree,
}

/// What a module did with a command.
#[derive(Debug)]
pub enum Handled {
    /// Zero outputs means the command was deferred or dropped.
    Emit(Vec<Output>),
    Delegate(BindRequest),
}

impl Handled {
    pub fn tree(tree: CommandTree) -> Self {
        Handled::Emit(vec![Output::Tree(tree)])
    }

    pub fn suppressed() -> Self {
        Handled::Emit(Vec::new())
    }
}

/// One feature area of the converter.
///
/// `collect` runs for every command in the first pass and only gathers
/// facts; `convert` runs in the second pass. Both receive every command
/// whose key is listed in [`FeatureModule::commands`].
pub trait FeatureModule {
    fn id(&self) -> ModuleId;

    /// Lowercased command keys, e.g. `add cs policy`.
    fn commands(&self) -> &'static [&'static str];

    /// Categories served by [`FeatureModule::convert_bind`].
    fn bind_categories(&self) -> &'static [BindCategory] {
        &[]
    }

    fn bind_defaults(&self) -> BindDefaults {
        BindDefaults::default()
    }

    /// Register built-in policies and other fixed state.
    fn init(&mut self, _ctx: &mut ConversionContext) {}

    fn collect(
        &mut self,
        _ctx: &mut ConversionContext,
        _tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        Ok(())
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError>;

    fn convert_bind(
        &mut self,
        _ctx: &mut ConversionContext,
        request: BindRequest,
    ) -> Result<Vec<Output>, ConvertError> {
        Ok(vec![Output::Tree(request.tree)])
    }

    /// Runs once after every input command has been converted.
    fn final_call(&mut self, _ctx: &mut ConversionContext) -> Result<Vec<Output>, ConvertError> {
        Ok(Vec::new())
    }
}

/// Every module in registration order. Chained modules (several modules on
/// one command key) run in this order, as do final calls.
pub fn default_modules() -> Vec<Box<dyn FeatureModule>> {
    vec![
        Box::new(lb::LoadBalancing),
        Box::new(cache_redirection::CacheRedirection),
        Box::new(tm_session::TmSession),
        Box::new(vpn::Vpn),
        Box::new(appfw::AppFw::default()),
        Box::new(policy_entities::PolicyEntities),
        Box::new(named_expression::NamedExpression),
        Box::new(http_profile::HttpProfile),
        Box::new(content_switching::ContentSwitching::default()),
        Box::new(aaa::Aaa),
        Box::new(adv_expression::AdvExpression),
        Box::new(ssl::Ssl::default()),
        Box::new(unsupported::Unsupported),
        Box::new(ns_features::NsFeatures),
        Box::new(rewrite::Rewrite::default()),
    ]
}

/// Lowercased first value of the keyword naming the bound policy.
pub(crate) fn policy_name(tree: &CommandTree, keyword: &str) -> Option<String> {
    tree.keyword_value(keyword).map(str::to_lowercase)
}
