//! 引擎启停的级联规则

use serde::Serialize;

/// 引擎状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Disabled,
    Enabled,
}

impl EngineState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            EngineState::Enabled
        } else {
            EngineState::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        matches!(self, EngineState::Enabled)
    }
}

/// 分类开关引起的引擎状态变化
pub struct CategoryCascade;

impl CategoryCascade {
    /// 启用分类后引擎应处于的状态；`None` 表示无需变化
    pub fn after_enable(current: EngineState, has_credentials: bool) -> Option<EngineState> {
        match current {
            // 已配置凭据才能自动启用
            EngineState::Disabled if has_credentials => Some(EngineState::Enabled),
            _ => None,
        }
    }

    /// 停用分类后引擎应处于的状态
    pub fn after_disable(current: EngineState, remaining: usize) -> Option<EngineState> {
        match current {
            // 最后一个分类关闭时停用引擎
            EngineState::Enabled if remaining == 0 => Some(EngineState::Disabled),
            _ => None,
        }
    }

    /// 需要引擎已启用的操作
    pub fn require_enabled(current: EngineState) -> bool {
        current.is_enabled()
    }
}
